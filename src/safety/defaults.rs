/// Default `(pattern, reason)` blocklist for `run_command`.
///
/// This is a tripwire for obviously destructive commands. It sits behind the
/// `run_command` capability gate and is not a sandbox.
pub fn default_blocklist() -> Vec<(String, String)> {
    [
        (r"(?i)\bsudo\b", "Privilege escalation (sudo) not allowed"),
        (r"(?i)\bsu\b\s", "Privilege escalation (su) not allowed"),
        (r"(?i)\bdoas\b", "Privilege escalation (doas) not allowed"),
        (r"rm\s+(-[^\s]*)?(\s+-[^\s]*)?\s+/($|\s)", "Recursive deletion at root not allowed"),
        (r"rm\s+(-[^\s]*)?(\s+-[^\s]*)?\s+/\*", "Recursive deletion at root not allowed"),
        (r"rm\s+(-[^\s]*)?(\s+-[^\s]*)?\s+~/?($|\s)", "Deleting the home directory not allowed"),
        (r">\s*/(etc|usr|boot|sys|proc)/", "Write to system directory not allowed"),
        (r"(?i)\bmkfs\b", "Filesystem formatting not allowed"),
        (r"(?i)\bdd\b\s.*of=/dev/", "Direct device writes not allowed"),
        (r":\(\)\s*\{.*\}", "Fork bomb pattern detected"),
        (r"(?i)\b(shutdown|reboot|halt|poweroff)\b", "System power control not allowed"),
        (r"(chmod|chown)\s.*\s/($|\s|[a-z])", "Permission changes at root level not allowed"),
        (r"(?i)(curl|wget)\s[^|]*\|\s*(sh|bash|zsh)\b", "Piping downloads into a shell not allowed"),
    ]
    .into_iter()
    .map(|(pattern, reason)| (pattern.to_string(), reason.to_string()))
    .collect()
}
