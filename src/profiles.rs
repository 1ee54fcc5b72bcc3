use std::collections::HashMap;
use std::sync::Arc;

use crate::card::profile_url;
use crate::github::{self, ApiError};

/// Identity shown on a rendered card. `avatar_url` is absent for profiles
/// reconstructed from the static table; the renderer substitutes a
/// letter-initial placeholder instead of issuing another network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub login: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub html_url: String,
}

pub trait ProfileService: Send + Sync {
    fn lookup(&self, handle: &str) -> Result<Profile, ApiError>;
}

/// Live lookups against the profile API.
pub struct GithubProfileService {
    client: Arc<github::Client>,
}

impl GithubProfileService {
    pub fn new(client: Arc<github::Client>) -> Self {
        Self { client }
    }
}

impl ProfileService for GithubProfileService {
    fn lookup(&self, handle: &str) -> Result<Profile, ApiError> {
        let record = self.client.user(handle)?;
        Ok(Profile {
            login: record.login,
            name: record.name,
            avatar_url: Some(record.avatar_url),
            bio: record.bio,
            html_url: record.html_url,
        })
    }
}

/// Fixed name table consulted before the live service; known contributors
/// render without a network call.
pub struct StaticProfileService {
    table: HashMap<String, String>,
    host: String,
}

impl StaticProfileService {
    pub fn new(table: HashMap<String, String>, host: impl Into<String>) -> Self {
        Self {
            table,
            host: host.into(),
        }
    }
}

impl ProfileService for StaticProfileService {
    fn lookup(&self, handle: &str) -> Result<Profile, ApiError> {
        match self.table.get(handle) {
            Some(name) => Ok(Profile {
                login: handle.to_string(),
                name: Some(name.clone()),
                avatar_url: None,
                bio: None,
                html_url: profile_url(&self.host, handle),
            }),
            None => Err(ApiError::NotFound),
        }
    }
}

#[derive(Default)]
pub struct MockProfileService;

impl ProfileService for MockProfileService {
    fn lookup(&self, handle: &str) -> Result<Profile, ApiError> {
        Ok(Profile {
            login: handle.to_string(),
            name: Some(format!("Sample {}", handle)),
            avatar_url: None,
            bio: None,
            html_url: profile_url("example.com", handle),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_hit_builds_profile() {
        let mut table = HashMap::new();
        table.insert("jsiegle".to_string(), "Josh Siegle".to_string());
        let service = StaticProfileService::new(table, "github.com");

        let profile = service.lookup("jsiegle").unwrap();
        assert_eq!(profile.name.as_deref(), Some("Josh Siegle"));
        assert_eq!(profile.html_url, "https://github.com/jsiegle");
        assert!(profile.avatar_url.is_none());
    }

    #[test]
    fn static_table_miss_is_not_found() {
        let service = StaticProfileService::new(HashMap::new(), "github.com");
        assert!(matches!(
            service.lookup("missing"),
            Err(ApiError::NotFound)
        ));
    }
}
