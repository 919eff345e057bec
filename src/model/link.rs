//! Client connection links.
//!
//! `<protocol>://<user>@<host>:<port>?security=..&sni=..&fp=..&pbk=..&sid=..&type=..#<name>`

use thiserror::Error;
use url::Url;

use super::reality::KeyError;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link has no host or port")]
    MissingEndpoint,

    #[error("malformed link: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Query parameters; empty values are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkParams {
    pub security: String,
    pub sni: String,
    pub fingerprint: String,
    pub public_key: String,
    pub short_id: String,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLink {
    pub protocol: String,
    pub user: String,
    pub host: String,
    pub port: u16,
    pub params: LinkParams,
    pub name: String,
}

impl ConnectionLink {
    pub fn render(&self) -> Result<String, LinkError> {
        if self.host.is_empty() || self.port == 0 {
            return Err(LinkError::MissingEndpoint);
        }

        let mut url = Url::parse(&format!("{}://{}:{}", self.protocol, self.host, self.port))?;
        url.set_username(&self.user)
            .map_err(|_| LinkError::MissingEndpoint)?;

        let params = [
            ("security", &self.params.security),
            ("sni", &self.params.sni),
            ("fp", &self.params.fingerprint),
            ("pbk", &self.params.public_key),
            ("sid", &self.params.short_id),
            ("type", &self.params.network),
        ];
        if params.iter().any(|(_, v)| !v.is_empty()) {
            let mut query = url.query_pairs_mut();
            for (key, value) in params.iter().filter(|(_, v)| !v.is_empty()) {
                query.append_pair(key, value);
            }
        }

        if !self.name.is_empty() {
            url.set_fragment(Some(&self.name));
        }
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link() -> ConnectionLink {
        ConnectionLink {
            protocol: "vless".into(),
            user: "11111111-1111-1111-1111-111111111111".into(),
            host: "camo.example.com".into(),
            port: 443,
            params: LinkParams {
                security: "reality".into(),
                sni: "www.example.com".into(),
                fingerprint: "chrome".into(),
                public_key: String::new(),
                short_id: "abcd1234".into(),
                network: "xhttp".into(),
            },
            name: "alice".into(),
        }
    }

    #[test]
    fn test_render_orders_parameters() {
        assert_eq!(
            link().render().unwrap(),
            "vless://11111111-1111-1111-1111-111111111111@camo.example.com:443\
             ?security=reality&sni=www.example.com&fp=chrome&sid=abcd1234&type=xhttp#alice"
        );
    }

    #[test]
    fn test_missing_endpoint() {
        let mut missing_host = link();
        missing_host.host.clear();
        assert!(matches!(missing_host.render(), Err(LinkError::MissingEndpoint)));

        let mut missing_port = link();
        missing_port.port = 0;
        assert!(matches!(missing_port.render(), Err(LinkError::MissingEndpoint)));
    }
}
