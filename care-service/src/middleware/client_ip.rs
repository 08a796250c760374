use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use service_core::middleware::rate_limit::client_ip_from_parts;
use std::convert::Infallible;

/// Best-effort caller address for audit entries, resolved the same way the
/// rate limiter keys requests.
#[derive(Debug, Clone, Default)]
pub struct ClientIp(pub Option<String>);

impl ClientIp {
    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip = client_ip_from_parts(&parts.headers, &parts.extensions);
        Ok(ClientIp(ip.map(|ip| ip.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn records_the_forwarded_address() {
        let (mut parts, _) = Request::builder()
            .header("x-forwarded-for", "203.0.113.20")
            .body(())
            .unwrap()
            .into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip.as_deref(), Some("203.0.113.20"));
    }

    #[tokio::test]
    async fn unknown_address_is_none() {
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(ip.is_none());
    }
}
