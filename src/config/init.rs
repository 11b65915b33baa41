// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates imgferry.yml template files.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    Ok(())
}

const TEMPLATE: &str = r#"# Where pulled images and blobs are kept (default: ~/.local/share/imgferry)
# store: /var/lib/imgferry

# Platform picked from multi-platform images (default: this host)
# platform: linux/amd64

transfer:
  retries: 3
  backoff: 5s
  tick: 100ms
  timeout: 15m
  plain_http: false

registries:
  - host: registry.example.com
    username: deploy
    password:
      env: REGISTRY_PASSWORD
    # Reach this registry over plain HTTP
    # insecure: true
"#;
