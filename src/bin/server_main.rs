#[tokio::main]
async fn main() {
    if let Err(e) = local_chat_relay::run().await {
        local_chat_relay::logger::error("app", &format!("Relay stopped: {}", e));
        std::process::exit(1);
    }
}
