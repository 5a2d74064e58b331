//! Key name normalization
//!
//! Keys arrive as free-form strings such as `"enter"`, `"Ctrl+Shift+t"` or
//! `"cmd+q"`. [`normalize_key`] maps them to xdotool keysym syntax
//! (`Return`, `ctrl+shift+t`, `super+q`); input providers translate from
//! that canonical form.

/// Canonical modifier names, in emission order
const MODIFIER_ORDER: &[&str] = &["ctrl", "alt", "shift", "super"];

/// Key combinations that close, lock or kill the session
const DANGEROUS_COMBOS: &[&[&str]] = &[
    &["alt", "F4"],
    &["ctrl", "alt", "Delete"],
    &["ctrl", "alt", "BackSpace"],
    &["ctrl", "shift", "Escape"],
    &["super", "l"],
    &["super", "q"],
];

fn modifier_alias(token: &str) -> Option<&'static str> {
    match token.to_ascii_lowercase().as_str() {
        "ctrl" | "control" | "ctl" => Some("ctrl"),
        "alt" | "option" | "opt" => Some("alt"),
        "shift" => Some("shift"),
        "super" | "win" | "windows" | "cmd" | "command" | "meta" => Some("super"),
        _ => None,
    }
}

fn named_key(token: &str) -> Option<&'static str> {
    let key = match token.to_ascii_lowercase().as_str() {
        "enter" | "return" | "ret" => "Return",
        "tab" => "Tab",
        "esc" | "escape" => "Escape",
        "backspace" | "bs" | "back_space" => "BackSpace",
        "delete" | "del" => "Delete",
        "insert" | "ins" => "Insert",
        "home" => "Home",
        "end" => "End",
        "pageup" | "page_up" | "pgup" | "prior" => "Page_Up",
        "pagedown" | "page_down" | "pgdn" | "next" => "Page_Down",
        "up" | "arrowup" => "Up",
        "down" | "arrowdown" => "Down",
        "left" | "arrowleft" => "Left",
        "right" | "arrowright" => "Right",
        "space" | "spacebar" => "space",
        "capslock" | "caps_lock" => "Caps_Lock",
        "print" | "printscreen" | "prtsc" => "Print",
        "menu" => "Menu",
        "f1" => "F1",
        "f2" => "F2",
        "f3" => "F3",
        "f4" => "F4",
        "f5" => "F5",
        "f6" => "F6",
        "f7" => "F7",
        "f8" => "F8",
        "f9" => "F9",
        "f10" => "F10",
        "f11" => "F11",
        "f12" => "F12",
        _ => return None,
    };
    Some(key)
}

fn base_key(token: &str) -> Option<String> {
    if let Some(key) = named_key(token) {
        return Some(key.to_string());
    }
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_graphic() => Some(c.to_string()),
        _ => None,
    }
}

/// Splits `"ctrl++"` style input into modifiers and the final key
fn split_combo(key: &str) -> (Vec<&str>, &str) {
    if key == "+" {
        return (Vec::new(), "+");
    }
    if let Some(rest) = key.strip_suffix("++") {
        let mods = rest.split('+').filter(|t| !t.is_empty()).collect();
        return (mods, "+");
    }
    let mut parts: Vec<&str> = key.split('+').map(str::trim).collect();
    let last = parts.pop().unwrap_or_default();
    (parts, last)
}

/// Normalizes a key or key combination to xdotool syntax
///
/// Returns `None` for empty input, unknown key names, unknown modifiers or a
/// combination made only of modifiers.
///
/// ```
/// use computer_use_core::safety::normalize_key;
///
/// assert_eq!(normalize_key("enter").as_deref(), Some("Return"));
/// assert_eq!(normalize_key("Shift+Control+t").as_deref(), Some("ctrl+shift+t"));
/// assert_eq!(normalize_key("cmd+space").as_deref(), Some("super+space"));
/// assert_eq!(normalize_key("hyper+x"), None);
/// ```
pub fn normalize_key(key: &str) -> Option<String> {
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let (mod_tokens, last) = split_combo(key);

    let mut modifiers = Vec::with_capacity(mod_tokens.len());
    for token in mod_tokens {
        let modifier = modifier_alias(token)?;
        if !modifiers.contains(&modifier) {
            modifiers.push(modifier);
        }
    }
    modifiers.sort_by_key(|m| MODIFIER_ORDER.iter().position(|o| o == m));

    // A bare modifier is a valid key press; a modifier as the final key of
    // a combination is folded into the modifier set.
    let base = match base_key(last) {
        Some(base) => base,
        None if modifiers.is_empty() => modifier_alias(last)?.to_string(),
        None => return None,
    };

    // Letters in combinations are sent lowercase; shift is explicit.
    let base = if !modifiers.is_empty() && base.chars().count() == 1 {
        base.to_ascii_lowercase()
    } else {
        base
    };

    let mut parts: Vec<&str> = modifiers;
    parts.push(&base);
    Some(parts.join("+"))
}

/// True if the normalized combination closes, locks or kills the session
pub fn is_dangerous_combo(normalized: &str) -> bool {
    let parts: Vec<&str> = normalized.split('+').collect();
    DANGEROUS_COMBOS.iter().any(|combo| {
        combo.len() == parts.len()
            && combo
                .iter()
                .all(|k| parts.iter().any(|p| p.eq_ignore_ascii_case(k)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(normalize_key("enter").as_deref(), Some("Return"));
        assert_eq!(normalize_key("RETURN").as_deref(), Some("Return"));
        assert_eq!(normalize_key("esc").as_deref(), Some("Escape"));
        assert_eq!(normalize_key("pgup").as_deref(), Some("Page_Up"));
        assert_eq!(normalize_key("bs").as_deref(), Some("BackSpace"));
        assert_eq!(normalize_key("f11").as_deref(), Some("F11"));
    }

    #[test]
    fn test_combinations_are_ordered() {
        assert_eq!(normalize_key("ctrl+c").as_deref(), Some("ctrl+c"));
        assert_eq!(normalize_key("Shift+Ctrl+T").as_deref(), Some("ctrl+shift+t"));
        assert_eq!(normalize_key("control + alt + del").as_deref(), Some("ctrl+alt+Delete"));
        assert_eq!(normalize_key("win+e").as_deref(), Some("super+e"));
    }

    #[test]
    fn test_plus_key() {
        assert_eq!(normalize_key("+").as_deref(), Some("+"));
        assert_eq!(normalize_key("ctrl++").as_deref(), Some("ctrl++"));
    }

    #[test]
    fn test_single_characters_keep_case_alone() {
        assert_eq!(normalize_key("A").as_deref(), Some("A"));
        assert_eq!(normalize_key("7").as_deref(), Some("7"));
    }

    #[test]
    fn test_bare_modifier() {
        assert_eq!(normalize_key("shift").as_deref(), Some("shift"));
        assert_eq!(normalize_key("Super").as_deref(), Some("super"));
    }

    #[test]
    fn test_rejects_unknown() {
        assert_eq!(normalize_key(""), None);
        assert_eq!(normalize_key("   "), None);
        assert_eq!(normalize_key("hyper+x"), None);
        assert_eq!(normalize_key("notakey"), None);
        assert_eq!(normalize_key("ctrl+"), None);
        assert_eq!(normalize_key("ctrl+shift"), None);
    }

    #[test]
    fn test_dangerous_combos() {
        let check = |k: &str| is_dangerous_combo(&normalize_key(k).unwrap());
        assert!(check("alt+f4"));
        assert!(check("ctrl+alt+delete"));
        assert!(check("Alt+Ctrl+Del"));
        assert!(check("ctrl+shift+esc"));
        assert!(check("cmd+q"));
        assert!(!check("ctrl+c"));
        assert!(!check("F4"));
        assert!(!check("ctrl+alt+t"));
    }
}
