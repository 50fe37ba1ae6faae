use serde::{Deserialize, Serialize};

/// Pages every signed-in user may open.
pub const PUBLIC_PAGES: &[&str] = &["", "index.html", "home.html", "login.html"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    Create,
    Update,
    Delete,
    Export,
    Approve,
    ManageUsers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageAccess {
    All,
    Only(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct RoleRule {
    /// Lowercase fragment looked for inside the role name.
    pub pattern: &'static str,
    pub pages: PageAccess,
    pub permissions: &'static [Permission],
}

const ALL_PERMISSIONS: &[Permission] = &[
    Permission::Read,
    Permission::Create,
    Permission::Update,
    Permission::Delete,
    Permission::Export,
    Permission::Approve,
    Permission::ManageUsers,
];

const STANDARD_RULES: &[RoleRule] = &[
    RoleRule {
        pattern: "admin",
        pages: PageAccess::All,
        permissions: ALL_PERMISSIONS,
    },
    RoleRule {
        pattern: "supervisor",
        pages: PageAccess::Only(&[
            "inventory.html",
            "movements.html",
            "departments.html",
            "reports.html",
            "management.html",
            "qr-repository.html",
            "scanner.html",
        ]),
        permissions: &[Permission::Read, Permission::Export, Permission::Approve],
    },
    RoleRule {
        pattern: "capturista",
        pages: PageAccess::Only(&[
            "inventory.html",
            "add-item.html",
            "management.html",
            "movements.html",
            "qr-repository.html",
            "scanner.html",
        ]),
        permissions: &[Permission::Read, Permission::Create, Permission::Update],
    },
    RoleRule {
        pattern: "auditor",
        pages: PageAccess::Only(&[
            "inventory.html",
            "movements.html",
            "departments.html",
            "reports.html",
            "qr-repository.html",
        ]),
        permissions: &[Permission::Read, Permission::Export],
    },
    RoleRule {
        pattern: "reportes",
        pages: PageAccess::Only(&["inventory.html", "reports.html"]),
        permissions: &[Permission::Read, Permission::Export],
    },
    RoleRule {
        pattern: "usuario",
        pages: PageAccess::Only(&["inventory.html", "qr-repository.html", "scanner.html"]),
        permissions: &[Permission::Read, Permission::Export],
    },
    RoleRule {
        pattern: "user",
        pages: PageAccess::Only(&["inventory.html", "qr-repository.html", "scanner.html"]),
        permissions: &[Permission::Read, Permission::Export],
    },
];

/// Ordered role rules. The first rule whose pattern occurs in the lowercased
/// role name decides; substring matching means `"Usuario Admin"` is an admin.
#[derive(Debug, Clone)]
pub struct RoleTable {
    rules: Vec<RoleRule>,
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl RoleTable {
    pub fn standard() -> Self {
        Self {
            rules: STANDARD_RULES.to_vec(),
        }
    }

    pub fn rule_for(&self, role: &str) -> Option<&RoleRule> {
        let role = role.to_lowercase();
        self.rules.iter().find(|rule| role.contains(rule.pattern))
    }

    pub fn is_admin(&self, role: &str) -> bool {
        self.rule_for(role)
            .map_or(false, |rule| rule.pages == PageAccess::All)
    }

    pub fn is_page_allowed(&self, role: &str, page: &str) -> bool {
        let page = clean_page(page);
        if PUBLIC_PAGES.contains(&page.as_str()) {
            return true;
        }
        match self.rule_for(role).map(|rule| rule.pages) {
            Some(PageAccess::All) => true,
            Some(PageAccess::Only(pages)) => pages.contains(&page.as_str()),
            None => false,
        }
    }

    pub fn has_permission(&self, role: &str, permission: Permission) -> bool {
        self.rule_for(role)
            .map_or(false, |rule| rule.permissions.contains(&permission))
    }
}

/// Last path segment, lowercased, without query string or fragment:
/// `"../pages/Users.html?x=1"` becomes `"users.html"`.
pub fn clean_page(page: &str) -> String {
    let page = page.split(['?', '#']).next().unwrap_or("");
    page.rsplit('/').next().unwrap_or("").trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_page() {
        assert_eq!(clean_page("../pages/users.html?tab=2"), "users.html");
        assert_eq!(clean_page("/pages/Inventory.html#top"), "inventory.html");
        assert_eq!(clean_page("scanner.html"), "scanner.html");
        assert_eq!(clean_page("/"), "");
    }

    #[test]
    fn test_admin_matches_case_insensitive_substrings() {
        let table = RoleTable::standard();
        assert!(table.is_admin("Admin"));
        assert!(table.is_admin("ADMINISTRADOR"));
        assert!(table.is_admin("Sub-Administrador de Bienes"));
        assert!(!table.is_admin("Capturista"));
        assert!(table.is_page_allowed("Administrador", "config.html"));
    }

    #[test]
    fn test_page_gating_per_role() {
        let table = RoleTable::standard();
        assert!(table.is_page_allowed("Capturista", "pages/add-item.html"));
        assert!(!table.is_page_allowed("Capturista", "users.html"));
        assert!(table.is_page_allowed("Usuario", "inventory.html"));
        assert!(!table.is_page_allowed("Usuario", "management.html"));
        assert!(table.is_page_allowed("User", "scanner.html"));
        assert!(!table.is_page_allowed("Invitado", "inventory.html"));
        // Public pages regardless of role
        assert!(table.is_page_allowed("Invitado", "home.html"));
        assert!(table.is_page_allowed("Invitado", ""));
    }

    #[test]
    fn test_substring_false_positive_is_preserved() {
        // "usuario" inside a longer role name still matches the read-only rule
        let table = RoleTable::standard();
        let rule = table.rule_for("Usuario Temporal").unwrap();
        assert_eq!(rule.pattern, "usuario");
    }

    #[test]
    fn test_permissions() {
        let table = RoleTable::standard();
        assert!(table.has_permission("capturista", Permission::Create));
        assert!(!table.has_permission("capturista", Permission::Delete));
        assert!(table.has_permission("Supervisor", Permission::Approve));
        assert!(table.has_permission("Admin", Permission::ManageUsers));
        assert!(!table.has_permission("auditor", Permission::Update));
        assert!(!table.has_permission("", Permission::Read));
    }
}
