// Key-name table shared by single presses and chords.
use enigo::Key;

/// Split a `+`-joined chord ("ctrl+shift+s") into its key names.
/// A lone "+" is the plus key itself.
pub fn parse_chord(chord: &str) -> Vec<String> {
    let chord = chord.trim();
    if chord == "+" {
        return vec!["+".to_string()];
    }
    chord.split('+')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn is_chord(chord: &str) -> bool {
    parse_chord(chord).len() > 1
}

/// Map a recorded key name to an enigo key. Names are case-insensitive;
/// any single character maps to its unicode key.
pub fn to_enigo_key(name: &str) -> Option<Key> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "enter" | "return" => Key::Return,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "escape" | "esc" => Key::Escape,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "page_up" | "pageup" => Key::PageUp,
        "page_down" | "pagedown" => Key::PageDown,
        "ctrl" | "control" => Key::Control,
        "alt" | "option" => Key::Alt,
        "shift" => Key::Shift,
        "cmd" | "command" | "win" | "meta" | "super" => Key::Meta,
        "capslock" | "caps_lock" => Key::CapsLock,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        _ => {
            let mut chars = name.trim().chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return None,
            }
        }
    };
    Some(key)
}
