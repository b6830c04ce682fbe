use crate::config::Config;
use crate::util::{ProxyError, Result};
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::Item;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// server config for the https listener, `None` when no cert and key are set
pub fn load_rustls_config(config: &Config) -> Result<Option<ServerConfig>> {
    let (cert_path, key_path) = match config.tls_paths() {
        Some(paths) => paths,
        None => return Ok(None),
    };

    let chain = read_cert_chain(cert_path)?;
    let key = read_private_key(key_path)?;

    let server_config = ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;

    Ok(Some(server_config))
}

fn pem_items(path: &Path) -> Result<Vec<Item>> {
    let file = File::open(path)
        .map_err(|e| ProxyError::TlsConfig(format!("cannot open {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let mut items = Vec::new();
    while let Some(item) = rustls_pemfile::read_one(&mut reader)
        .map_err(|e| ProxyError::TlsConfig(format!("bad pem in {}: {}", path.display(), e)))?
    {
        items.push(item);
    }
    Ok(items)
}

/// every certificate in the file, leaf first
fn read_cert_chain(path: &Path) -> Result<Vec<Certificate>> {
    let chain: Vec<Certificate> = pem_items(path)?
        .into_iter()
        .filter_map(|item| match item {
            Item::X509Certificate(der) => Some(Certificate(der)),
            _ => None,
        })
        .collect();

    if chain.is_empty() {
        return Err(ProxyError::TlsConfig(format!("no certificates in {}", path.display())));
    }
    Ok(chain)
}

/// the first pkcs8, rsa or sec1 key in the file
fn read_private_key(path: &Path) -> Result<PrivateKey> {
    pem_items(path)?
        .into_iter()
        .find_map(|item| match item {
            Item::PKCS8Key(der) | Item::RSAKey(der) | Item::ECKey(der) => Some(PrivateKey(der)),
            _ => None,
        })
        .ok_or_else(|| ProxyError::TlsConfig(format!("no private key in {}", path.display())))
}
