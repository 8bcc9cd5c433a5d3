//! The daemon's wire loop: one JSON [`nexus_proto::Request`] per stdin
//! line, one JSON [`nexus_proto::Response`] per stdout line (§6.1). Logs
//! each request/response the way a long-lived accept/spawn/handle loop
//! does, with the transport itself kept deliberately simple: this is a
//! single-client, single-threaded line protocol over stdio, not a
//! length-prefixed socket protocol.

use nexus_proto::{Command, ErrorKind, Request, Response, StatusError};
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::daemon::Daemon;

fn framed_line(response: &Response) -> String {
	let mut line = response.to_line();
	line.push('\n');
	line
}

async fn write_line<W: AsyncWriteExt + Unpin>(out: &mut W, response: &Response) -> io::Result<()> {
	out.write_all(framed_line(response).as_bytes()).await?;
	out.flush().await
}

#[cfg(unix)]
async fn wait_for_sigterm() {
	match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
		Ok(mut sigterm) => {
			sigterm.recv().await;
		}
		Err(err) => {
			tracing::warn!(%err, "failed to install SIGTERM handler");
			std::future::pending::<()>().await;
		}
	}
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
	std::future::pending::<()>().await;
}

/// Runs the daemon's request loop to completion: reads lines from stdin,
/// dispatches each through [`Daemon::handle_request`] under its own
/// watchdog, and writes one response line per request. Returns once EOF,
/// `quit`, SIGINT, or SIGTERM tells it to stop; the caller is responsible
/// for process exit code (spec §4.11: shutdown always exits 0).
pub async fn run_stdio(daemon: &mut Daemon) -> io::Result<()> {
	let mut lines = BufReader::new(io::stdin()).lines();
	let mut stdout = io::stdout();

	loop {
		let line = tokio::select! {
			biased;
			_ = tokio::signal::ctrl_c() => {
				tracing::info!("received SIGINT, shutting down");
				None
			}
			_ = wait_for_sigterm() => {
				tracing::info!("received SIGTERM, shutting down");
				None
			}
			result = lines.next_line() => result?,
		};

		let Some(line) = line else { break };
		if line.trim().is_empty() {
			continue;
		}

		let request: Request = match serde_json::from_str(&line) {
			Ok(request) => request,
			Err(e) => {
				let response = Response::err("unknown", StatusError::new(ErrorKind::BadRequest, format!("malformed request: {e}")));
				write_line(&mut stdout, &response).await?;
				continue;
			}
		};

		let is_quit = matches!(request.command, Command::Quit);
		let response = daemon.handle_request(request).await;
		write_line(&mut stdout, &response).await?;
		if is_quit {
			tracing::info!("received quit, shutting down");
			break;
		}
	}

	daemon.shutdown().await;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn framed_line_has_exactly_one_trailing_newline() {
		let response = Response::ok("ping", serde_json::json!({"uptime_ms": 1}));
		let line = framed_line(&response);
		assert_eq!(line.matches('\n').count(), 1);
		assert!(line.ends_with('\n'));
	}
}
