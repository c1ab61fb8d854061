#[tokio::main]
async fn main() {
    if let Err(e) = campus_market::run().await {
        eprintln!("{:?}", e);
        std::process::exit(1);
    }
}
