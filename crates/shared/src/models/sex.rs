use std::fmt;

use serde::{Deserialize, Serialize};

/// Sex dimension of the output tables.
///
/// Variants are declared in label order so that sorted tables list
/// "Feminino" before "Masculino".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Sex {
    Feminino,
    Masculino,
}

impl Sex {
    /// Normalizes a raw sex code from any of the warehouse tables.
    ///
    /// Registry and census microdata use "1"/"2"; the 2022 census aggregates
    /// use "Homens"/"Mulheres". Unknown codes ("0", "9", blanks) yield `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" | "Homens" | "Masculino" | "M" => Some(Self::Masculino),
            "2" | "Mulheres" | "Feminino" | "F" => Some(Self::Feminino),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Feminino => "Feminino",
            Self::Masculino => "Masculino",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(Sex::from_code("1"), Some(Sex::Masculino));
        assert_eq!(Sex::from_code("2"), Some(Sex::Feminino));
        assert_eq!(Sex::from_code("Homens"), Some(Sex::Masculino));
        assert_eq!(Sex::from_code("Mulheres"), Some(Sex::Feminino));
        assert_eq!(Sex::from_code(" Feminino "), Some(Sex::Feminino));
        assert_eq!(Sex::from_code("9"), None);
        assert_eq!(Sex::from_code(""), None);
    }

    #[test]
    fn test_label_order() {
        let mut sexes = vec![Sex::Masculino, Sex::Feminino];
        sexes.sort();
        assert_eq!(sexes, vec![Sex::Feminino, Sex::Masculino]);
        assert_eq!(Sex::Masculino.to_string(), "Masculino");
    }
}
