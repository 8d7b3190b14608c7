use std::path::PathBuf;

// Expand a leading `~` the way the scripts' paths under the home directory expect.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

pub fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_only_touches_leading_tilde() {
        let home = home_dir();
        assert_eq!(expand_home("~/Workspace"), home.join("Workspace"));
        assert_eq!(expand_home("~"), home);
        assert_eq!(expand_home("/tmp/~x"), PathBuf::from("/tmp/~x"));
    }
}
