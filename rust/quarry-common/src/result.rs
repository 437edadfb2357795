pub type Result<T> = std::result::Result<T, crate::error::Error>;

#[macro_export]
macro_rules! verify_arg {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_arg(result, stringify!($name), stringify!($expr))?;
    }};
}

#[macro_export]
macro_rules! verify_data {
    ($name:expr, $expr:expr) => {{
        let result = $expr;
        $crate::result::verify_data(result, stringify!($name), stringify!($expr))?;
    }};
}

#[inline]
pub fn verify_arg(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_arg(name, condition)
    }
}

#[inline]
pub fn verify_data(predicate: bool, name: &str, condition: &str) -> Result<()> {
    if predicate {
        Ok(())
    } else {
        invalid_format(name, condition)
    }
}

#[cold]
pub fn invalid_arg(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidArgument {
        name: name.to_string(),
        message: condition.to_string(),
    }
    .into())
}

#[cold]
pub fn invalid_format(name: &str, condition: &str) -> Result<()> {
    Err(crate::error::ErrorKind::InvalidFormat {
        element: name.to_string(),
        message: condition.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    fn check_threshold(threshold: usize) -> super::Result<usize> {
        verify_arg!(threshold, threshold > 0);
        Ok(threshold)
    }

    fn check_delimiters(count: usize) -> super::Result<()> {
        verify_data!(qualifier, count >= 2);
        Ok(())
    }

    #[test]
    fn test_verify_arg() {
        assert_eq!(check_threshold(3).unwrap(), 3);
        let err = check_threshold(0).unwrap_err();
        match err.kind() {
            ErrorKind::InvalidArgument { name, message } => {
                assert_eq!(name, "threshold");
                assert_eq!(message, "threshold > 0");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_verify_data() {
        assert!(check_delimiters(2).is_ok());
        assert!(matches!(
            check_delimiters(1).unwrap_err().kind(),
            ErrorKind::InvalidFormat { .. }
        ));
    }
}
