//! HTTP(S) GET probe.

use crate::error::ProbeError;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::Request;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use once_cell::sync::OnceCell;
use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio::time::{Duration, timeout};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Empty<Bytes>>;

static TLS_CONFIG: OnceCell<Arc<ClientConfig>> = OnceCell::new();
static CLIENT: OnceCell<HttpsClient> = OnceCell::new();

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Shared TLS client configuration, built once with the webpki roots.
pub fn shared_tls_config() -> Arc<ClientConfig> {
    TLS_CONFIG
        .get_or_init(|| {
            // Several rustls providers are compiled in; pick one before building.
            let _ = rustls::crypto::ring::default_provider().install_default();

            let mut root_cert_store = RootCertStore::empty();
            root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

            let config = ClientConfig::builder()
                .with_root_certificates(root_cert_store)
                .with_no_client_auth();

            Arc::new(config)
        })
        .clone()
}

fn client() -> &'static HttpsClient {
    CLIENT.get_or_init(|| {
        let https = HttpsConnectorBuilder::new()
            .with_tls_config((*shared_tls_config()).clone())
            .https_or_http()
            .enable_http1()
            .build();
        Client::builder(TokioExecutor::new()).build(https)
    })
}

/// Issues a GET and treats any status below 400 as healthy.
pub async fn check(address: &str, limit: Duration) -> Result<(), ProbeError> {
    let url = url::Url::parse(address.trim()).map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ProbeError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    let uri = url
        .as_str()
        .parse::<hyper::Uri>()
        .map_err(|e| ProbeError::InvalidUrl(e.to_string()))?;

    let req = Request::get(uri)
        .header(hyper::header::USER_AGENT, USER_AGENT)
        .body(Empty::<Bytes>::new())
        .map_err(|e| ProbeError::Transport(e.to_string()))?;

    let response = timeout(limit, client().request(req))
        .await
        .map_err(|_| ProbeError::Timeout(limit))?
        .map_err(|e| ProbeError::Transport(error_chain(&e)))?;

    let code = response.status().as_u16();
    if code >= 400 {
        return Err(ProbeError::Status(code));
    }
    Ok(())
}

/// Joins an error with all of its sources, `outer: inner: root`.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_tls_config_is_reused() {
        let a = shared_tls_config();
        let b = shared_tls_config();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let err = check("ftp://example.com", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl(_)));

        let err = check("not a url", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidUrl(_)));
    }
}
