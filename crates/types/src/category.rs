use serde::{Deserialize, Serialize};
use std::fmt;

/// Service tier a customer is assigned to by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceCategory {
    Basic,
    EService,
    Plus,
    Total,
}

impl ServiceCategory {
    /// All tiers, ordered by label.
    pub const ALL: [ServiceCategory; 4] = [
        ServiceCategory::Basic,
        ServiceCategory::EService,
        ServiceCategory::Plus,
        ServiceCategory::Total,
    ];

    /// Map a raw classifier label onto a tier. Unknown labels yield `None`.
    pub fn from_label(label: u32) -> Option<Self> {
        match label {
            1 => Some(ServiceCategory::Basic),
            2 => Some(ServiceCategory::EService),
            3 => Some(ServiceCategory::Plus),
            4 => Some(ServiceCategory::Total),
            _ => None,
        }
    }

    pub fn label(self) -> u32 {
        match self {
            ServiceCategory::Basic => 1,
            ServiceCategory::EService => 2,
            ServiceCategory::Plus => 3,
            ServiceCategory::Total => 4,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ServiceCategory::Basic => "Basic Service",
            ServiceCategory::EService => "E-Service",
            ServiceCategory::Plus => "Plus Service",
            ServiceCategory::Total => "Total Service",
        }
    }
}

impl fmt::Display for ServiceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Human-facing name for a raw label, falling back for labels outside 1–4.
pub fn category_name(label: u32) -> &'static str {
    ServiceCategory::from_label(label)
        .map(ServiceCategory::display_name)
        .unwrap_or("Unknown category")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for category in ServiceCategory::ALL {
            assert_eq!(ServiceCategory::from_label(category.label()), Some(category));
        }
    }

    #[test]
    fn names_match_service_tiers() {
        assert_eq!(category_name(1), "Basic Service");
        assert_eq!(category_name(2), "E-Service");
        assert_eq!(category_name(3), "Plus Service");
        assert_eq!(category_name(4), "Total Service");
        assert_eq!(category_name(0), "Unknown category");
        assert_eq!(category_name(9), "Unknown category");
    }
}
