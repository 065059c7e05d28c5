use std::fmt;

/// Naming hierarchies a distinguished name can be read along.
///
/// Keys are listed from the root of the hierarchy to its leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hierarchy {
    Country,
    Domain,
    Organization,
}

impl Hierarchy {
    pub const ALL: [Hierarchy; 3] = [Hierarchy::Country, Hierarchy::Organization, Hierarchy::Domain];

    pub fn keys(&self) -> &'static [&'static str] {
        match self {
            Hierarchy::Country => &["C", "ST", "L", "STREET", "CN"],
            Hierarchy::Domain => &["DC", "UID"],
            Hierarchy::Organization => &["O", "OU", "CN"],
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys().contains(&key)
    }

    /// Key that anchors the hierarchy (must close the name)
    pub fn root(&self) -> &'static str {
        self.keys()[0]
    }

    /// Key naming the entity itself
    pub fn leaf(&self) -> &'static str {
        self.keys()[self.keys().len() - 1]
    }
}

impl fmt::Display for Hierarchy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hierarchy::Country => "country",
            Hierarchy::Domain => "domain",
            Hierarchy::Organization => "organization",
        };
        f.write_str(name)
    }
}
