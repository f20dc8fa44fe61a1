//! Fixed table of reduction operators accepted by the analysis service.

use crate::RasterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Mean,
    Min,
    Max,
    Median,
    StdDev,
    Variance,
    Count,
    First,
    Last,
    Product,
    /// Logical AND over non-zero pixel values.
    All,
    /// Logical OR over non-zero pixel values.
    Any,
}

const SUPPORTED: [(&str, Reducer); 13] = [
    ("SUM", Reducer::Sum),
    ("MEAN", Reducer::Mean),
    ("MIN", Reducer::Min),
    ("MAX", Reducer::Max),
    ("MEDIAN", Reducer::Median),
    ("STD_DEV", Reducer::StdDev),
    ("VARIANCE", Reducer::Variance),
    ("COUNT", Reducer::Count),
    ("FIRST", Reducer::First),
    ("LAST", Reducer::Last),
    ("PROD", Reducer::Product),
    ("ALL", Reducer::All),
    ("ANY", Reducer::Any),
];

impl Reducer {
    /// Case-insensitive lookup. Unknown names are rejected with the
    /// supported set in the error message.
    pub fn from_name(name: &str) -> Result<Self, RasterError> {
        let upper = name.trim().to_ascii_uppercase();
        SUPPORTED
            .iter()
            .find(|(canonical, _)| *canonical == upper)
            .map(|(_, reducer)| *reducer)
            .ok_or_else(|| RasterError::UnknownReducer {
                name: name.to_string(),
                supported: supported_names().join(", "),
            })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reducer::Sum => "SUM",
            Reducer::Mean => "MEAN",
            Reducer::Min => "MIN",
            Reducer::Max => "MAX",
            Reducer::Median => "MEDIAN",
            Reducer::StdDev => "STD_DEV",
            Reducer::Variance => "VARIANCE",
            Reducer::Count => "COUNT",
            Reducer::First => "FIRST",
            Reducer::Last => "LAST",
            Reducer::Product => "PROD",
            Reducer::All => "ALL",
            Reducer::Any => "ANY",
        }
    }
}

pub fn supported_names() -> Vec<&'static str> {
    SUPPORTED.iter().map(|(canonical, _)| *canonical).collect()
}
