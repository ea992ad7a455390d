use crate::error::SearchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Crops with a disease index. The set is closed; anything else is rejected
/// with [`SearchError::UnsupportedCrop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crop {
    Chrysanthemum,
    Peony,
    Carnation,
    Rose,
    ChinaAster,
    Balsam,
}

impl Crop {
    pub const ALL: [Crop; 6] = [
        Crop::Chrysanthemum,
        Crop::Peony,
        Crop::Carnation,
        Crop::Rose,
        Crop::ChinaAster,
        Crop::Balsam,
    ];

    /// Korean display name, as used by the disease catalog and in index metadata.
    pub fn display_name(self) -> &'static str {
        match self {
            Crop::Chrysanthemum => "국화",
            Crop::Peony => "작약",
            Crop::Carnation => "카네이션",
            Crop::Rose => "장미",
            Crop::ChinaAster => "과꽃",
            Crop::Balsam => "봉숭아(봉선화)",
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Crop::Chrysanthemum => "FL022402",
            Crop::Peony => "FL022425",
            Crop::Carnation => "FL022427",
            Crop::Rose => "FL082028",
            Crop::ChinaAster => "FL012105",
            Crop::Balsam => "FL012131",
        }
    }

    /// Storage and collection identifier. Derived from the code only, so it is
    /// stable across renames of the display name and safe for file systems.
    pub fn collection_name(self) -> String {
        format!("crop_{}", self.code().to_ascii_lowercase())
    }

    /// Accepts either the display name or the crop code.
    pub fn resolve(name: &str) -> Result<Self, SearchError> {
        let trimmed = name.trim();
        Self::ALL
            .into_iter()
            .find(|crop| crop.display_name() == trimmed || crop.code().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| SearchError::UnsupportedCrop {
                crop: name.to_string(),
            })
    }

    pub fn display_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|crop| crop.display_name()).collect()
    }
}

impl FromStr for Crop {
    type Err = SearchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::resolve(value)
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::Crop;
    use crate::SearchError;
    use std::collections::HashSet;

    #[test]
    fn resolves_display_name_and_code() {
        assert_eq!(Crop::resolve("장미").ok(), Some(Crop::Rose));
        assert_eq!(Crop::resolve("fl082028").ok(), Some(Crop::Rose));
        assert_eq!("봉숭아(봉선화)".parse::<Crop>().ok(), Some(Crop::Balsam));
    }

    #[test]
    fn unknown_crop_is_rejected() {
        let error = Crop::resolve("존재하지않는작물");
        assert!(matches!(error, Err(SearchError::UnsupportedCrop { crop }) if crop == "존재하지않는작물"));
    }

    #[test]
    fn collection_names_are_unique_and_ascii() {
        let names: HashSet<String> = Crop::ALL.iter().map(|crop| crop.collection_name()).collect();
        assert_eq!(names.len(), Crop::ALL.len());
        assert!(names.iter().all(|name| name.is_ascii()));
        assert_eq!(Crop::Rose.collection_name(), "crop_fl082028");
    }
}
