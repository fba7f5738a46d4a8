//! GoGo Board over USB serial.
//!
//! The board prints one line per sample with three sensor values at
//! 9600 baud, 8N1.

use crate::payload::parse_serial_line;
use crate::{ConnectorError, Row};
use indexmap::IndexMap;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

/// Baud rate the board firmware uses.
pub const BAUD_RATE: u32 = 9600;

/// Open the board's serial port at [`BAUD_RATE`].
///
/// Must be called from within a tokio runtime.
pub fn open_device(path: &Path) -> Result<BufReader<SerialStream>, ConnectorError> {
    let port = tokio_serial::new(path.to_string_lossy(), BAUD_RATE).open_native_async()?;
    tracing::info!("Reading GoGo Board from {} at {} baud", path.display(), BAUD_RATE);
    Ok(BufReader::new(port))
}

/// Turn each valid line into a row with `sensor1`..`sensor3`.
///
/// Malformed lines are logged and skipped. Returns the number of rows sent
/// once the reader hits end of input or the row receiver goes away.
pub async fn read_lines<R>(reader: R, rows: mpsc::Sender<Row>) -> Result<u64, ConnectorError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut sent = 0;

    while let Some(line) = lines.next_line().await? {
        let readings = match parse_serial_line(&line) {
            Ok(readings) => readings,
            Err(e) => {
                tracing::warn!("Skipping serial line {:?}: {}", line, e);
                continue;
            }
        };

        let values: IndexMap<String, f64> = readings
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("sensor{}", i + 1), *v))
            .collect();
        if rows.send(Row::now(None, values)).await.is_err() {
            break;
        }
        sent += 1;
    }

    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_lines_become_rows() {
        let input: &[u8] = b"10,20,30\ngarbage\n\n{\"s1\":1,\"s2\":2,\"s3\":3}\n1,2\n";
        let (tx, mut rx) = mpsc::channel(8);

        let sent = read_lines(input, tx).await.unwrap();
        assert_eq!(sent, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.board, None);
        assert_eq!(
            first.values,
            IndexMap::from([
                ("sensor1".to_string(), 10.0),
                ("sensor2".to_string(), 20.0),
                ("sensor3".to_string(), 30.0),
            ])
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(second.values["sensor3"], 3.0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn missing_device_is_a_serial_error() {
        let opened = open_device(Path::new("/dev/gogodata-no-such-port"));
        assert!(matches!(opened, Err(ConnectorError::Serial(_))));
    }
}
