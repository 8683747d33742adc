use clap::Parser;

/// Deferred callback service: registers HTTP requests and fires them after a delay.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "deferred-dispatch")]
#[command(about = "Holds HTTP requests in memory and sends them after a delay")]
pub struct Config {
    /// Address to bind.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log filter used when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// `host:port`, ready for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Default tracing filter for this crate and the HTTP layer.
    pub fn default_filter(&self) -> String {
        format!("deferred_dispatch={0},tower_http={0}", self.log_level)
    }
}
