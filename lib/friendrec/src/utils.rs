use std::str::FromStr;

pub fn env_var_truthy(name: &str) -> bool {
    match std::env::var(name) {
        Ok(v) => {
            let v = v.to_ascii_lowercase();
            v == "1" || v == "true" || v == "yes" || v == "on"
        }
        Err(_) => false,
    }
}

/// Parsed value of `name`, or `None` when unset or unparseable.
pub fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        std::env::set_var("FRIENDREC_TEST_TRUTHY", "Yes");
        assert!(env_var_truthy("FRIENDREC_TEST_TRUTHY"));
        std::env::set_var("FRIENDREC_TEST_TRUTHY", "0");
        assert!(!env_var_truthy("FRIENDREC_TEST_TRUTHY"));
        assert!(!env_var_truthy("FRIENDREC_TEST_TRUTHY_UNSET"));
    }

    #[test]
    fn parse_falls_back_to_none() {
        std::env::set_var("FRIENDREC_TEST_PARSE", " 12 ");
        assert_eq!(env_parse::<usize>("FRIENDREC_TEST_PARSE"), Some(12));
        std::env::set_var("FRIENDREC_TEST_PARSE", "twelve");
        assert_eq!(env_parse::<usize>("FRIENDREC_TEST_PARSE"), None);
    }
}
