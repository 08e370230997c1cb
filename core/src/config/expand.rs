//! `${env:VAR}` placeholder and `~` expansion for configuration values.

/// Replace every `${env:NAME}` placeholder with the value of `NAME`.
///
/// Unset variables expand to an empty string. An unterminated placeholder
/// is left untouched.
pub fn expand_env_placeholders(input: &str) -> String {
    const PREFIX: &str = "${env:";

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find(PREFIX) {
        out.push_str(&rest[..start]);
        let after = &rest[start + PREFIX.len()..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Expand a leading `~` (alone or followed by a separator) to the home directory.
pub fn expand_tilde(input: &str) -> String {
    let home = || {
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .ok()
    };

    if input == "~" {
        return home().unwrap_or_else(|| input.to_string());
    }
    if let Some(rest) = input
        .strip_prefix("~/")
        .or_else(|| input.strip_prefix("~\\"))
    {
        if let Some(home) = home() {
            return format!("{}/{}", home.trim_end_matches(['/', '\\']), rest);
        }
    }
    input.to_string()
}
