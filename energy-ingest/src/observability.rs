use tracing_subscriber::{filter::Directive, EnvFilter};

const DEFAULT_DIRECTIVES: [&str; 2] = ["energy_ingest=info", "energy_client=info"];

/// Installs the global fmt subscriber. `RUST_LOG` adds to the defaults.
pub fn init_tracing() {
    let filter = DEFAULT_DIRECTIVES
        .iter()
        .filter_map(|d| d.parse::<Directive>().ok())
        .fold(EnvFilter::from_default_env(), |f, d| f.add_directive(d));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
