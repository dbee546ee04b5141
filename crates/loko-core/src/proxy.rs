//! TLS reverse proxy configuration

use crate::Result;
use std::path::{Path, PathBuf};

/// Proxy configuration file written next to the manifest
pub const CONFIG_FILE: &str = "nginx.conf";
/// Directory holding `cert.pem` and `key.pem`, next to the manifest
pub const CERTS_DIR: &str = "certs";

/// Render the nginx server blocks
///
/// Plain HTTP is redirected; HTTPS is terminated and forwarded to the gateway.
pub fn render_config(server_name: &str) -> String {
    format!(
        r#"server {{
    listen 80;
    server_name {server_name};
    return 301 https://$host$request_uri;
}}

server {{
    listen 443 ssl;
    server_name {server_name};

    ssl_certificate /etc/nginx/certs/cert.pem;
    ssl_certificate_key /etc/nginx/certs/key.pem;

    client_max_body_size 100M;

    location / {{
        proxy_pass http://gateway:8080;
        proxy_set_header Host $host;
        proxy_set_header X-Real-IP $remote_addr;
        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;
        proxy_set_header X-Forwarded-Proto $scheme;
        proxy_http_version 1.1;
        proxy_set_header Upgrade $http_upgrade;
        proxy_set_header Connection "upgrade";
    }}
}}
"#
    )
}

/// Write the proxy config into `dir` and return the files a deploy must copy
pub fn write_config(dir: &Path, server_name: &str) -> Result<Vec<PathBuf>> {
    let config = dir.join(CONFIG_FILE);
    std::fs::write(&config, render_config(server_name))?;
    let mut files = vec![config];
    let certs = dir.join(CERTS_DIR);
    if certs.is_dir() {
        files.push(certs);
    } else {
        tracing::warn!(path = %certs.display(), "no certificate directory, proxy will not start until one is provided");
    }
    Ok(files)
}

/// Proxy files already present in `dir`
pub fn existing_files(dir: &Path) -> Vec<PathBuf> {
    [CONFIG_FILE, CERTS_DIR]
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_config() {
        let conf = render_config("shop.example.com");
        assert!(conf.contains("server_name shop.example.com;"));
        assert!(conf.contains("proxy_pass http://gateway:8080;"));
        assert!(conf.contains("return 301 https://$host$request_uri;"));
    }

    #[test]
    fn test_write_config_lists_files() {
        let tmp = tempfile::tempdir().unwrap();
        let files = write_config(tmp.path(), "_").unwrap();
        assert_eq!(files, vec![tmp.path().join(CONFIG_FILE)]);

        std::fs::create_dir(tmp.path().join(CERTS_DIR)).unwrap();
        let files = write_config(tmp.path(), "_").unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(existing_files(tmp.path()), files);
    }
}
