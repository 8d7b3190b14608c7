use super::OessError;
use std::path::Path;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    // The file holds the username then the password, whitespace separated.
    pub fn parse(contents: &str, origin: &str) -> Result<Self, OessError> {
        let mut words = contents.split_whitespace();
        match (words.next(), words.next()) {
            (Some(username), Some(password)) => Ok(Self {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => Err(OessError::Credentials(origin.to_string())),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, OessError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents, &path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_first_two_words() {
        let c = Credentials::parse("yt4xb  s3cret\n", "test").unwrap();
        assert_eq!(c.username, "yt4xb");
        assert_eq!(c.password, "s3cret");
    }

    #[test]
    fn parse_rejects_single_word() {
        let err = Credentials::parse("onlyuser\n", "pw-file").unwrap_err();
        assert!(matches!(err, OessError::Credentials(origin) if origin == "pw-file"));
    }

    #[test]
    fn debug_hides_password() {
        let c = Credentials::parse("u p", "test").unwrap();
        assert!(!format!("{:?}", c).contains("\"p\""));
    }
}
