use std::env;

use tracing::error;

#[tokio::main]
async fn main() {
    nestegg::logging::init();

    let raw_args: Vec<String> = env::args().collect();
    match raw_args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let port_arg = match raw_args.get(2).map(|s| s.as_str()) {
                Some("--port") => raw_args.get(3),
                _ => raw_args.get(2),
            };
            let port = port_arg
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(8080);
            if let Err(e) = nestegg::api::run_http_server(port).await {
                error!("server error: {e}");
                std::process::exit(1);
            }
        }
        Some("simulate") => {
            if let Err(e) = nestegg::api::run_cli(&raw_args[1..]) {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
        _ => {
            eprintln!("Usage: nestegg serve [--port PORT] | nestegg simulate [--help]");
            std::process::exit(1);
        }
    }
}
