//! Forwarding of the engine's own log output.
//!
//! Every line read from the pipe is written as `"<prefix>: <line>"`. Bytes that
//! are not valid UTF-8 are replaced, never dropped. Only I/O failures on either
//! side end forwarding, silently; the pipe is best-effort.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;

use bitcoind_core::engine::LogPipe;

/// Copy `reader` to `writer` line by line, prefixing each line.
/// Returns the number of lines forwarded.
pub async fn forward_lines<R, W>(reader: R, mut writer: W, prefix: &str) -> usize
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarded = 0;
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let line = trim_line_end(&buf);
        let out = format!("{prefix}: {}\n", String::from_utf8_lossy(line));
        if writer.write_all(out.as_bytes()).await.is_err() {
            break;
        }
        forwarded += 1;
    }
    let _ = writer.flush().await;
    forwarded
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Forward the engine pipe to stdout in the background.
pub fn spawn_stdout_forwarder(pipe: LogPipe, prefix: String) -> JoinHandle<usize> {
    tokio::spawn(async move { forward_lines(pipe, tokio::io::stdout(), &prefix).await })
}
