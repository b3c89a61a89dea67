//! Terminal client
//!
//! Prints every line from the server and forwards every stdin line to it.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};

use crate::error::AppError;
use crate::message::END;

/// Connect to `addr` and run until `end`, stdin EOF or server disconnect
///
/// A dial failure is returned as a fatal error.
pub async fn run_client(addr: &str) -> Result<(), AppError> {
    let stream = TcpStream::connect(addr).await?;
    let (read_half, write_half) = stream.into_split();

    let mut from_server = FramedRead::new(read_half, LinesCodec::new());
    let mut to_server = FramedWrite::new(write_half, LinesCodec::new());
    let mut stdin = FramedRead::new(tokio::io::stdin(), LinesCodec::new());

    let mut printer = tokio::spawn(async move {
        while let Some(Ok(line)) = from_server.next().await {
            println!("{}", line);
        }
        println!("Server disconnected");
    });

    loop {
        tokio::select! {
            input = stdin.next() => {
                let Some(Ok(line)) = input else {
                    break;
                };
                let done = line == END;
                to_server.send(line).await?;
                if done {
                    break;
                }
            }
            _ = &mut printer => return Ok(()),
        }
    }

    let _ = SinkExt::<String>::close(&mut to_server).await;
    printer.abort();
    Ok(())
}
