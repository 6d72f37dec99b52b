/// Everything that can make a single route solution file unusable.
#[derive(thiserror::Error, Debug)]
pub enum CleanError {
    #[error("missing required column {column:?}")]
    Schema { column: String },

    #[error("couldn't parse {field} from {value:?}: {reason}")]
    Parse {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl CleanError {
    pub fn parse(field: &'static str, value: impl Into<String>, reason: impl ToString) -> Self {
        CleanError::Parse {
            field,
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
