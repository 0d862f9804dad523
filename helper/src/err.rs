use std::fmt;

/// Several independent failures gathered while walking a list of peers; the
/// walk goes on and the failures are reported together.
#[derive(Debug, Default)]
pub struct IndividualErrorList {
    list: Vec<anyhow::Error>,
}

impl IndividualErrorList {
    pub fn push(&mut self, err: anyhow::Error) { self.list.push(err); }

    pub fn is_empty(&self) -> bool { self.list.is_empty() }

    pub fn len(&self) -> usize { self.list.len() }
}

impl fmt::Display for IndividualErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.list)
    }
}

impl std::error::Error for IndividualErrorList {}

/// Log the error of a `Result` (by reference) without consuming it.
#[macro_export]
macro_rules! log_err {
    ($res:expr) => {
        if let Err(err) = &$res {
            tracing::error!("{:?}", err);
        }
    };
    ($res:expr, warn) => {
        if let Err(err) = &$res {
            tracing::warn!("{:?}", err);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_list_display() {
        let mut errors = IndividualErrorList::default();
        assert!(errors.is_empty());
        errors.push(anyhow::anyhow!("peer a is down"));
        errors.push(anyhow::anyhow!("peer b is down"));
        assert_eq!(errors.len(), 2);
        let text = errors.to_string();
        assert!(text.contains("peer a is down"));
        assert!(text.contains("peer b is down"));
    }
}
