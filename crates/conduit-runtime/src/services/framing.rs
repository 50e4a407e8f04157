//! Newline-delimited JSON framing

use crate::error::{Result, RuntimeError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};

/// Read the next frame; `Ok(None)` once the peer closed the stream
pub async fn read_frame<T, R>(lines: &mut Lines<R>) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: AsyncBufRead + Unpin,
{
    loop {
        match lines.next_line().await? {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => {
                return serde_json::from_str(&line)
                    .map(Some)
                    .map_err(|e| RuntimeError::Protocol(format!("bad frame: {}", e)))
            }
        }
    }
}

pub async fn write_frame<T, W>(writer: &mut W, frame: &T) -> Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Register;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_frames_over_a_pipe() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut write) = tokio::io::split(client);
        let (read, _) = tokio::io::split(server);
        let mut lines = BufReader::new(read).lines();

        write_frame(&mut write, &Register { worker_id: "w1".to_string() })
            .await
            .unwrap();
        write.write_all(b"\n").await.unwrap();
        write_frame(&mut write, &Register { worker_id: "w2".to_string() })
            .await
            .unwrap();
        drop(write);

        let first: Register = read_frame(&mut lines).await.unwrap().unwrap();
        let second: Register = read_frame(&mut lines).await.unwrap().unwrap();
        assert_eq!(first.worker_id, "w1");
        assert_eq!(second.worker_id, "w2");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_a_protocol_error() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut write) = tokio::io::split(client);
        let (read, _) = tokio::io::split(server);
        let mut lines = BufReader::new(read).lines();

        write.write_all(b"{not json\n").await.unwrap();
        let err = read_frame::<Register, _>(&mut lines).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Protocol(_)));
    }
}
