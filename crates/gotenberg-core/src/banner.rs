//! The startup banner.

const ART: &str = r#"
  _____     __           __
 / ___/__  / /____ ___  / /  ___ _______ _
/ (_ / _ \/ __/ -_) _ \/ _ \/ -_) __/ _ `/
\___/\___/\__/\__/_//_/_.__/\__/_/  \_, /
                                   /___/
"#;

const TAGLINE: &str = "A containerized API for seamless PDF conversion.";

const RULE_WIDTH: usize = 55;

/// The banner, tagline and version, closed by a rule line.
pub fn banner(version: &str) -> String {
    format!(
        "{}\n\n{TAGLINE}\nVersion: {version}\n{}",
        ART.trim_matches('\n'),
        "-".repeat(RULE_WIDTH)
    )
}

/// `[SYSTEM] modules: a b c`
pub fn modules_line<I, S>(ids: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let ids: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
    format!("[SYSTEM] modules: {}", ids.join(" "))
}
