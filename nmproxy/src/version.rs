//! Version information for nmproxy.

/// nmproxy version from Cargo.toml
pub const NMPROXY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent sent on relay POSTs.
pub fn user_agent() -> String {
    format!("nmproxy/{}", NMPROXY_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_agent_carries_version() {
        assert_eq!(user_agent(), format!("nmproxy/{}", env!("CARGO_PKG_VERSION")));
    }
}
