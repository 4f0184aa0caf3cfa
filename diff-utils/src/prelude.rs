// SPDX-License-Identifier: MIT

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Result<T> = std::result::Result<T, Error>;

/// Run `f` and prefix any errors with the string returned by `prefix`.
pub fn try_forward<'a, F, R, C, S>(f: F, prefix: C) -> Result<R>
where
    F: FnOnce() -> Result<R>,
    C: 'a + Fn() -> S,
    S: Into<String>,
{
    #[derive(Debug)]
    struct WrappedError {
        prefix: String,
        cause: Error,
    }
    impl std::fmt::Display for WrappedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}: {}", self.prefix, self.cause)
        }
    }
    impl std::error::Error for WrappedError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(self.cause.as_ref())
        }
    }

    match f() {
        Err(err) => Err(Box::new(WrappedError {
            prefix: prefix().into(),
            cause: err,
        })),
        Ok(result) => Ok(result),
    }
}

pub use crate::partition_point::PartitionPointExt;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_try_forward() {
        let result = try_forward(
            || -> Result<()> {
                Err("boom")?;
                Ok(())
            },
            || "outer",
        );
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), "outer: boom");
        assert!(err.source().is_some());

        let result = try_forward(|| Ok(3), || "unused");
        assert_eq!(result.unwrap(), 3);
    }
}
