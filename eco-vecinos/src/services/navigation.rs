use crate::models::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub path: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub roles: &'static [Role],
}

pub const NAV_ITEMS: &[NavItem] = &[
    NavItem {
        path: "/dashboard",
        label: "Tablón",
        icon: "📌",
        roles: &Role::ALL,
    },
    NavItem {
        path: "/dashboard/communities",
        label: "Comunidades",
        icon: "🏢",
        roles: &[Role::SuperAdmin],
    },
    NavItem {
        path: "/dashboard/neighbors",
        label: "Vecinos",
        icon: "👥",
        roles: &[Role::SuperAdmin, Role::President],
    },
    NavItem {
        path: "/dashboard/incidents",
        label: "Incidencias",
        icon: "🛠",
        roles: &Role::ALL,
    },
    NavItem {
        path: "/dashboard/meetings",
        label: "Juntas",
        icon: "📅",
        roles: &Role::ALL,
    },
];

/// Items `role` may see, in table order. Without a role nothing is shown.
pub fn visible_nav(role: Option<Role>, items: &[NavItem]) -> Vec<NavItem> {
    let Some(role) = role else {
        return Vec::new();
    };
    items
        .iter()
        .filter(|item| item.roles.contains(&role))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[NavItem]) -> Vec<&'static str> {
        items.iter().map(|item| item.label).collect()
    }

    #[test]
    fn owner_does_not_see_communities() {
        let items = visible_nav(Some(Role::Owner), NAV_ITEMS);
        assert_eq!(labels(&items), vec!["Tablón", "Incidencias", "Juntas"]);
    }

    #[test]
    fn president_sees_neighbors_in_order() {
        let items = visible_nav(Some(Role::President), NAV_ITEMS);
        assert_eq!(
            labels(&items),
            vec!["Tablón", "Vecinos", "Incidencias", "Juntas"]
        );
    }

    #[test]
    fn admin_sees_everything() {
        assert_eq!(visible_nav(Some(Role::SuperAdmin), NAV_ITEMS), NAV_ITEMS.to_vec());
    }

    #[test]
    fn no_role_sees_nothing() {
        assert!(visible_nav(None, NAV_ITEMS).is_empty());
    }

    #[test]
    fn result_is_a_subsequence_of_the_input() {
        for role in Role::ALL {
            let visible = visible_nav(Some(role), NAV_ITEMS);
            let mut remaining = NAV_ITEMS.iter();
            for item in &visible {
                assert!(remaining.any(|candidate| candidate == item));
            }
        }
    }
}
