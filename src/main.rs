use std::env;

use salesgrid::app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let bind = args.get(1).cloned().unwrap_or_else(|| "127.0.0.1:3000".to_string());
    let store_path = args
        .get(2)
        .cloned()
        .unwrap_or_else(|| "snapshots.bin.gz".to_string());
    let forecast_url = args
        .get(3)
        .cloned()
        .or_else(|| env::var("FORECAST_URL").ok())
        .unwrap_or_else(|| "http://127.0.0.1:8000".to_string());

    app::run(&bind, &store_path, &forecast_url).await
}
