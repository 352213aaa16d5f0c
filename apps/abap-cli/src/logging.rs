use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter for `-v` repetitions; `RUST_LOG` overrides it.
fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,abapkit=info",
        1 => "info",
        2 => "info,abapkit=debug,abapkit_auth=debug,abapkit_http=debug",
        _ => "trace",
    }
}

/// Log to stderr, keeping stdout for command output.
pub fn init(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
}
