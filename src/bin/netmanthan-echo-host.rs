//! Diagnostic native handler.
//!
//! Speaks the native messaging protocol on stdin/stdout and answers every
//! request with `{"status": "received", "echo": <request>}`. A request of
//! the form `{"command": "exit", "code": N}` makes it exit with status `N`
//! without answering.
//!
//! Logs go to stderr; set `RUST_LOG=debug` for per-message output.

use std::process::ExitCode;

use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use netmanthan_bridge::Result;
use netmanthan_bridge::protocol::codec;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .init();

    let mut args = std::env::args().skip(1);
    let manifest = args.next().unwrap_or_default();
    let extension = args.next().unwrap_or_default();
    info!(%manifest, %extension, "Echo host started");

    match serve(&mut tokio::io::stdin(), &mut tokio::io::stdout()).await {
        Ok(None) => {
            info!("Bridge closed the channel");
            ExitCode::SUCCESS
        }
        Ok(Some(code)) => {
            info!(code, "Exit requested");
            ExitCode::from(code)
        }
        Err(e) => {
            error!(error = %e, "Echo host failed");
            ExitCode::FAILURE
        }
    }
}

/// Answers requests until EOF or an exit command.
async fn serve<R, W>(input: &mut R, output: &mut W) -> Result<Option<u8>>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    while let Some(body) = codec::read_frame(input, codec::MAX_OUTBOUND_MESSAGE_SIZE).await? {
        let request: Value = serde_json::from_slice(&body)?;
        debug!(bytes = body.len(), "Request received");

        if request.get("command").and_then(Value::as_str) == Some("exit") {
            let code = request.get("code").and_then(Value::as_u64).unwrap_or(0);
            return Ok(Some(u8::try_from(code).unwrap_or(u8::MAX)));
        }

        let reply = serde_json::to_vec(&json!({ "status": "received", "echo": request }))?;
        let frame = codec::frame(&reply, codec::MAX_INBOUND_MESSAGE_SIZE)?;
        codec::write_frame(output, &frame).await?;
    }

    Ok(None)
}
