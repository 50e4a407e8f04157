//! Well-known URNs
//!
//! These strings are matched bit-for-bit by the runner and its collaborators.

// Transforms
pub const IMPULSE: &str = "beam:transform:impulse:v1";
pub const PAR_DO: &str = "beam:transform:pardo:v1";
pub const FLATTEN: &str = "beam:transform:flatten:v1";
pub const GROUP_BY_KEY: &str = "beam:transform:group_by_key:v1";
pub const ASSIGN_WINDOWS: &str = "beam:transform:window_into:v1";

/// Runner-only primitive: partition elements by key, no window merging
pub const DIRECT_GBKO: &str = "urn:beam:directrunner:transforms:gbko:v1";
/// Runner-only primitive: group a key's elements by window
pub const DIRECT_GABW: &str = "urn:beam:directrunner:transforms:gabw:v1";

/// Synthetic transform standing in for a fused stage
pub const EXECUTABLE_STAGE: &str = "beam:runner:executable_stage:v1";

// Coders
pub const BYTES_CODER: &str = "beam:coder:bytes:v1";
pub const STRING_UTF8_CODER: &str = "beam:coder:string_utf8:v1";
pub const VARINT_CODER: &str = "beam:coder:varint:v1";
pub const KV_CODER: &str = "beam:coder:kv:v1";
pub const ITERABLE_CODER: &str = "beam:coder:iterable:v1";
pub const GLOBAL_WINDOW_CODER: &str = "beam:coder:global_window:v1";
pub const INTERVAL_WINDOW_CODER: &str = "beam:coder:interval_window:v1";

/// Auxiliary coder for the values flowing between GBKO and GABW. It keeps the
/// graph self-describing and is never used to encode elements.
pub const KEYED_WORK_ITEM_CODER: &str = "beam:direct:keyedworkitem:v1";

// Window functions
pub const GLOBAL_WINDOWS_FN: &str = "beam:window_fn:global_windows:v1";
pub const FIXED_WINDOWS_FN: &str = "beam:window_fn:fixed_windows:v1";

// Environments
pub const IN_PROCESS_ENVIRONMENT: &str = "conduit:env:in_process:v1";

/// Transforms the runner evaluates itself rather than in a worker environment
pub fn is_runner_primitive(urn: &str) -> bool {
    matches!(
        urn,
        IMPULSE | FLATTEN | ASSIGN_WINDOWS | DIRECT_GBKO | DIRECT_GABW
    )
}
