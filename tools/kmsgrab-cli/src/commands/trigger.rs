//! Ask a running daemon for a capture.

use std::path::Path;

use kmsgrab_command_server::{send_command, Command, Reply};

pub async fn run(socket_path: &Path) -> anyhow::Result<()> {
    let reply = send_command(socket_path, Command::Grab).await?;
    println!("{reply}");

    match reply {
        Reply::Ok => Ok(()),
        Reply::Err(reason) => anyhow::bail!("Daemon could not capture: {reason}"),
    }
}
