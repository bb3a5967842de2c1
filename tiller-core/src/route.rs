use crate::error::{Result, TillerError};
use serde::{Deserialize, Serialize};

/// L7 route — matches on subdomain/domain/path and either forwards to
/// targets or serves a static page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Subdomain to match on, e.g. `admin`.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub subdomain: String,

    /// Domain to match on, e.g. `myapp.com`.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub domain: String,

    /// Path prefix to match on, e.g. `/admin`.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub path: String,

    /// Target URLs, e.g. `http://127.0.0.1:8080/app1`.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub targets: Vec<String>,

    /// Path to forward to the targets in place of the matched path.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub fwdpath: String,

    /// Page body served instead of forwarding.
    #[serde(default, deserialize_with = "crate::service::nullable")]
    pub page: String,
}

impl Route {
    /// Routes are keyed by what they match on.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.subdomain, &self.domain, &self.path)
    }

    pub fn same_key(&self, other: &Route) -> bool {
        self.key() == other.key()
    }

    pub fn validate(&self) -> Result<()> {
        if self.domain.is_empty() && self.path.is_empty() {
            return Err(TillerError::validation("route needs a domain or a path"));
        }
        if let Some(bad) = self
            .targets
            .iter()
            .find(|t| !(t.starts_with("http://") || t.starts_with("https://")))
        {
            return Err(TillerError::validation(format!("invalid route target '{bad}'")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ignores_actions() {
        let a: Route = serde_json::from_str(
            r#"{"subdomain":"admin","domain":"myapp.com","path":"/admin","targets":["http://10.0.0.1"]}"#,
        )
        .unwrap();
        let mut b = a.clone();
        b.page = "<html>maintenance</html>".into();
        b.targets.clear();
        assert!(a.same_key(&b));
    }

    #[test]
    fn validate_requires_match_and_urls() {
        let mut r = Route {
            subdomain: String::new(),
            domain: String::new(),
            path: String::new(),
            targets: vec![],
            fwdpath: String::new(),
            page: String::new(),
        };
        assert!(r.validate().is_err());
        r.domain = "myapp.com".into();
        assert!(r.validate().is_ok());
        r.targets.push("10.0.0.1:80".into());
        assert!(r.validate().is_err());
    }
}
