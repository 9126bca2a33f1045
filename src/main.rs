#[tokio::main]
async fn main() {
    let code = lanequeue::app::startup::startup().await;
    std::process::exit(code);
}
