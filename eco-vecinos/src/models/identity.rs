use super::document::{empty_as_none, Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    President,
    Owner,
    Tenant,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::President, Role::Owner, Role::Tenant];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::President => "president",
            Role::Owner => "owner",
            Role::Tenant => "tenant",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Administración",
            Role::President => "Presidente",
            Role::Owner => "Propietario",
            Role::Tenant => "Inquilino",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "super_admin" => Ok(Role::SuperAdmin),
            "president" => Ok(Role::President),
            "owner" => Ok(Role::Owner),
            "tenant" => Ok(Role::Tenant),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Unknown or blank role strings in stored profiles read as "no role".
fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.and_then(|s| s.parse().ok()))
}

/// Account record as held by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: String,
    pub email: String,
    pub name: String,
}

/// Profile document in the users collection, keyed by the principal id.
///
/// Neighbors added by a president are profiles without a principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default, deserialize_with = "lenient_role")]
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub community_id: Option<String>,
    #[serde(default)]
    pub unit: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub linked_owner_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Record for Profile {
    const COLLECTION: Collection = Collection::Users;
}

/// The logged-in user: provider principal merged with its profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Option<Role>,
    pub community_id: Option<String>,
    pub unit: Option<String>,
    pub phone: Option<String>,
}

impl Identity {
    /// Identity built from the provider alone, used when no profile exists.
    pub fn from_principal(principal: Principal) -> Self {
        Self {
            id: principal.id,
            email: principal.email,
            name: principal.name,
            role: None,
            community_id: None,
            unit: None,
            phone: None,
        }
    }

    /// Profile values override provider values; blank profile strings do not.
    pub fn merge(principal: Principal, profile: Profile) -> Self {
        let pick = |profile_value: String, provider_value: String| {
            if profile_value.trim().is_empty() {
                provider_value
            } else {
                profile_value
            }
        };
        let non_empty = |value: String| Some(value).filter(|v| !v.trim().is_empty());

        Self {
            id: principal.id,
            email: pick(profile.email, principal.email),
            name: pick(profile.name, principal.name),
            role: profile.role,
            community_id: profile.community_id,
            unit: non_empty(profile.unit),
            phone: non_empty(profile.phone),
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == Some(role)
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.email.split('@').next().unwrap_or("Vecino")
        } else {
            &self.name
        }
    }

    pub fn initials(&self) -> String {
        let initials: String = self
            .display_name()
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .take(2)
            .collect::<String>()
            .to_uppercase();

        if initials.is_empty() {
            "V".to_string()
        } else {
            initials
        }
    }

    /// Sidebar badge text.
    pub fn panel_title(&self) -> &'static str {
        match self.role {
            Some(Role::SuperAdmin) => "Panel de Administración",
            Some(Role::President) => "Panel de Presidencia",
            _ => "Área de Vecinos",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn principal() -> Principal {
        Principal {
            id: "u1".to_string(),
            email: "ana@example.com".to_string(),
            name: "Ana".to_string(),
        }
    }

    #[test]
    fn merge_prefers_profile_fields() {
        let profile: Profile = serde_json::from_value(json!({
            "name": "Ana García",
            "email": "",
            "phone": "600000000",
            "role": "president",
            "community_id": "c1",
            "unit": "1º A"
        }))
        .unwrap();

        let identity = Identity::merge(principal(), profile);
        assert_eq!(identity.id, "u1");
        assert_eq!(identity.name, "Ana García");
        assert_eq!(identity.email, "ana@example.com");
        assert_eq!(identity.role, Some(Role::President));
        assert_eq!(identity.community_id.as_deref(), Some("c1"));
        assert_eq!(identity.unit.as_deref(), Some("1º A"));
    }

    #[test]
    fn provider_only_identity_has_no_role() {
        let identity = Identity::from_principal(principal());
        assert_eq!(identity.role, None);
        assert_eq!(identity.panel_title(), "Área de Vecinos");
    }

    #[test]
    fn unknown_role_strings_read_as_none() {
        let profile: Profile =
            serde_json::from_value(json!({ "role": "landlord", "community_id": "" })).unwrap();
        assert_eq!(profile.role, None);
        assert_eq!(profile.community_id, None);
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn initials_use_first_two_words() {
        let mut identity = Identity::from_principal(principal());
        identity.name = "ana garcía lópez".to_string();
        assert_eq!(identity.initials(), "AG");
    }
}
