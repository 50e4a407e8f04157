//! State service: an in-memory bag store for worker state requests

use super::framing::{read_frame, write_frame};
use super::Service;
use crate::error::Result;
use crate::protocol::{StateOp, StateRequest, StateResponse};
use async_trait::async_trait;
use conduit_core::Value;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

/// (instruction, transform, state key)
type StateCell = (String, String, String);

#[derive(Default)]
pub struct StateService {
    store: DashMap<StateCell, Vec<Value>>,
}

impl StateService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self, request: StateRequest) -> StateResponse {
        let cell = (
            request.instruction_id,
            request.transform_id,
            request.state_key,
        );
        let values = match request.op {
            StateOp::Get => self
                .store
                .get(&cell)
                .map(|values| values.value().clone())
                .unwrap_or_default(),
            StateOp::Append { values } => {
                self.store.entry(cell).or_default().extend(values);
                Vec::new()
            }
            StateOp::Clear => {
                self.store.remove(&cell);
                Vec::new()
            }
        };
        StateResponse {
            id: request.id,
            values,
            error: None,
        }
    }

    /// Drop every cell written while processing `instruction_id`
    pub fn clear_instruction(&self, instruction_id: &str) {
        self.store.retain(|(instruction, _, _), _| instruction != instruction_id);
    }

    pub fn cell_count(&self) -> usize {
        self.store.len()
    }
}

#[async_trait]
impl Service for StateService {
    fn name(&self) -> &'static str {
        "state"
    }

    async fn serve_connection(self: Arc<Self>, stream: TcpStream) -> Result<()> {
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();
        while let Some(request) = read_frame::<StateRequest, _>(&mut lines).await? {
            let response = self.handle(request);
            write_frame(&mut write, &response).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.store.clear();
        Ok(())
    }
}
