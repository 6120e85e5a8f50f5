use log::info;

#[tokio::main]
async fn main() {
    // Logging goes to stderr; stdout belongs to the protocol.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
    info!("starting jinja-ls");
    jinja_lsp::run_server().await;
}
