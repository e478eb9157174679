//! `mdl config` – print the config path and effective configuration.

use anyhow::Result;
use mdl_core::config::{self, MdlConfig};

pub fn run_config() -> Result<()> {
    let path = config::config_path()?;
    let cfg = config::load_or_init()?;
    println!("# {}", path.display());
    println!("# snapshot: {}", cfg.resolved_snapshot_path()?.display());
    print!("{}", render(&cfg)?);
    Ok(())
}

/// TOML form of `cfg` with the RPC secret masked.
fn render(cfg: &MdlConfig) -> Result<String> {
    let mut shown = cfg.clone();
    if shown.rpc_secret.is_some() {
        shown.rpc_secret = Some("********".to_string());
    }
    Ok(toml::to_string_pretty(&shown)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_masked() {
        let cfg = MdlConfig {
            rpc_secret: Some("hunter2".to_string()),
            ..MdlConfig::default()
        };
        let out = render(&cfg).unwrap();
        assert!(!out.contains("hunter2"));
        assert!(out.contains("rpc_secret"));
        assert!(out.contains("port = 3033"));
    }
}
