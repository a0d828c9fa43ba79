//! Birdwatch daemon entry point.

#![allow(clippy::print_stderr)]

#[tokio::main]
async fn main() {
    if let Err(e) = birdwatch::run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
