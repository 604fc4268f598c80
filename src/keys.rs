//! Key names, key combinations and their native representations.
//!
//! Text such as `"F11"`, `"ctrl + alt + s"` or `"Space"` is parsed into a
//! [`KeyCombo`], and every [`KeyCode`] knows how to present itself to the
//! hotkey backend (`global_hotkey`), the global injector (`enigo`) and the
//! Windows message path (virtual-key codes).
//!
//! Unknown names fail with [`RepeaterError::InvalidKeyFormat`]; nothing is
//! silently mapped to a fallback key.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use enigo::Key;
use global_hotkey::hotkey::{Code, HotKey, Modifiers};

use crate::error::{RepeaterError, Result};

macro_rules! key_codes {
    ($($variant:ident => $name:literal, $code:ident, $enigo:expr, $vk:literal;)+) => {
        /// A single non-modifier key.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum KeyCode {
            $($variant),+
        }

        impl KeyCode {
            /// Every supported key, in declaration order.
            pub const ALL: &'static [KeyCode] = &[$(KeyCode::$variant),+];

            /// Canonical display name.
            pub fn name(self) -> &'static str {
                match self {
                    $(KeyCode::$variant => $name),+
                }
            }

            /// Physical key code used for global hotkey registration.
            pub fn to_hotkey_code(self) -> Code {
                match self {
                    $(KeyCode::$variant => Code::$code),+
                }
            }

            /// Key understood by the global injector.
            pub fn to_enigo_key(self) -> Key {
                match self {
                    $(KeyCode::$variant => $enigo),+
                }
            }

            /// Windows virtual-key code, used for window-scoped injection.
            pub fn virtual_key(self) -> u16 {
                match self {
                    $(KeyCode::$variant => $vk),+
                }
            }
        }
    };
}

key_codes! {
    A => "A", KeyA, Key::Unicode('a'), 0x41;
    B => "B", KeyB, Key::Unicode('b'), 0x42;
    C => "C", KeyC, Key::Unicode('c'), 0x43;
    D => "D", KeyD, Key::Unicode('d'), 0x44;
    E => "E", KeyE, Key::Unicode('e'), 0x45;
    F => "F", KeyF, Key::Unicode('f'), 0x46;
    G => "G", KeyG, Key::Unicode('g'), 0x47;
    H => "H", KeyH, Key::Unicode('h'), 0x48;
    I => "I", KeyI, Key::Unicode('i'), 0x49;
    J => "J", KeyJ, Key::Unicode('j'), 0x4A;
    K => "K", KeyK, Key::Unicode('k'), 0x4B;
    L => "L", KeyL, Key::Unicode('l'), 0x4C;
    M => "M", KeyM, Key::Unicode('m'), 0x4D;
    N => "N", KeyN, Key::Unicode('n'), 0x4E;
    O => "O", KeyO, Key::Unicode('o'), 0x4F;
    P => "P", KeyP, Key::Unicode('p'), 0x50;
    Q => "Q", KeyQ, Key::Unicode('q'), 0x51;
    R => "R", KeyR, Key::Unicode('r'), 0x52;
    S => "S", KeyS, Key::Unicode('s'), 0x53;
    T => "T", KeyT, Key::Unicode('t'), 0x54;
    U => "U", KeyU, Key::Unicode('u'), 0x55;
    V => "V", KeyV, Key::Unicode('v'), 0x56;
    W => "W", KeyW, Key::Unicode('w'), 0x57;
    X => "X", KeyX, Key::Unicode('x'), 0x58;
    Y => "Y", KeyY, Key::Unicode('y'), 0x59;
    Z => "Z", KeyZ, Key::Unicode('z'), 0x5A;
    Digit0 => "0", Digit0, Key::Unicode('0'), 0x30;
    Digit1 => "1", Digit1, Key::Unicode('1'), 0x31;
    Digit2 => "2", Digit2, Key::Unicode('2'), 0x32;
    Digit3 => "3", Digit3, Key::Unicode('3'), 0x33;
    Digit4 => "4", Digit4, Key::Unicode('4'), 0x34;
    Digit5 => "5", Digit5, Key::Unicode('5'), 0x35;
    Digit6 => "6", Digit6, Key::Unicode('6'), 0x36;
    Digit7 => "7", Digit7, Key::Unicode('7'), 0x37;
    Digit8 => "8", Digit8, Key::Unicode('8'), 0x38;
    Digit9 => "9", Digit9, Key::Unicode('9'), 0x39;
    F1 => "F1", F1, Key::F1, 0x70;
    F2 => "F2", F2, Key::F2, 0x71;
    F3 => "F3", F3, Key::F3, 0x72;
    F4 => "F4", F4, Key::F4, 0x73;
    F5 => "F5", F5, Key::F5, 0x74;
    F6 => "F6", F6, Key::F6, 0x75;
    F7 => "F7", F7, Key::F7, 0x76;
    F8 => "F8", F8, Key::F8, 0x77;
    F9 => "F9", F9, Key::F9, 0x78;
    F10 => "F10", F10, Key::F10, 0x79;
    F11 => "F11", F11, Key::F11, 0x7A;
    F12 => "F12", F12, Key::F12, 0x7B;
    F13 => "F13", F13, Key::F13, 0x7C;
    F14 => "F14", F14, Key::F14, 0x7D;
    F15 => "F15", F15, Key::F15, 0x7E;
    F16 => "F16", F16, Key::F16, 0x7F;
    F17 => "F17", F17, Key::F17, 0x80;
    F18 => "F18", F18, Key::F18, 0x81;
    F19 => "F19", F19, Key::F19, 0x82;
    F20 => "F20", F20, Key::F20, 0x83;
    Up => "Up", ArrowUp, Key::UpArrow, 0x26;
    Down => "Down", ArrowDown, Key::DownArrow, 0x28;
    Left => "Left", ArrowLeft, Key::LeftArrow, 0x25;
    Right => "Right", ArrowRight, Key::RightArrow, 0x27;
    Space => "Space", Space, Key::Space, 0x20;
    Enter => "Enter", Enter, Key::Return, 0x0D;
    Tab => "Tab", Tab, Key::Tab, 0x09;
    Escape => "Escape", Escape, Key::Escape, 0x1B;
    Backspace => "Backspace", Backspace, Key::Backspace, 0x08;
    Delete => "Delete", Delete, Key::Delete, 0x2E;
    Home => "Home", Home, Key::Home, 0x24;
    End => "End", End, Key::End, 0x23;
    PageUp => "PageUp", PageUp, Key::PageUp, 0x21;
    PageDown => "PageDown", PageDown, Key::PageDown, 0x22;
    Insert => "Insert", Insert, raw_key(0x2D, 0xFF63, 0x72), 0x2D;
    CapsLock => "CapsLock", CapsLock, Key::CapsLock, 0x14;
    NumLock => "NumLock", NumLock, raw_key(0x90, 0xFF7F, 0x47), 0x90;
    ScrollLock => "ScrollLock", ScrollLock, raw_key(0x91, 0xFF14, 0x6B), 0x91;
    Semicolon => ";", Semicolon, Key::Unicode(';'), 0xBA;
    Equal => "=", Equal, Key::Unicode('='), 0xBB;
    Comma => ",", Comma, Key::Unicode(','), 0xBC;
    Minus => "-", Minus, Key::Unicode('-'), 0xBD;
    Period => ".", Period, Key::Unicode('.'), 0xBE;
    Slash => "/", Slash, Key::Unicode('/'), 0xBF;
    Backquote => "`", Backquote, Key::Unicode('`'), 0xC0;
    BracketLeft => "[", BracketLeft, Key::Unicode('['), 0xDB;
    Backslash => "\\", Backslash, Key::Unicode('\\'), 0xDC;
    BracketRight => "]", BracketRight, Key::Unicode(']'), 0xDD;
    Quote => "'", Quote, Key::Unicode('\''), 0xDE;
    Numpad0 => "Num0", Numpad0, raw_key(0x60, 0xFFB0, 0x52), 0x60;
    Numpad1 => "Num1", Numpad1, raw_key(0x61, 0xFFB1, 0x53), 0x61;
    Numpad2 => "Num2", Numpad2, raw_key(0x62, 0xFFB2, 0x54), 0x62;
    Numpad3 => "Num3", Numpad3, raw_key(0x63, 0xFFB3, 0x55), 0x63;
    Numpad4 => "Num4", Numpad4, raw_key(0x64, 0xFFB4, 0x56), 0x64;
    Numpad5 => "Num5", Numpad5, raw_key(0x65, 0xFFB5, 0x57), 0x65;
    Numpad6 => "Num6", Numpad6, raw_key(0x66, 0xFFB6, 0x58), 0x66;
    Numpad7 => "Num7", Numpad7, raw_key(0x67, 0xFFB7, 0x59), 0x67;
    Numpad8 => "Num8", Numpad8, raw_key(0x68, 0xFFB8, 0x5B), 0x68;
    Numpad9 => "Num9", Numpad9, raw_key(0x69, 0xFFB9, 0x5C), 0x69;
    NumpadMultiply => "NumMul", NumpadMultiply, raw_key(0x6A, 0xFFAA, 0x43), 0x6A;
    NumpadAdd => "NumAdd", NumpadAdd, raw_key(0x6B, 0xFFAB, 0x45), 0x6B;
    NumpadSubtract => "NumSub", NumpadSubtract, raw_key(0x6D, 0xFFAD, 0x4E), 0x6D;
    NumpadDecimal => "NumDot", NumpadDecimal, raw_key(0x6E, 0xFFAE, 0x41), 0x6E;
    NumpadDivide => "NumDiv", NumpadDivide, raw_key(0x6F, 0xFFAF, 0x4B), 0x6F;
}

/// Keys `enigo` names on some platforms only, sent as the running platform's
/// raw code: virtual-key on Windows, `kVK_` code on macOS, keysym on X11.
fn raw_key(vk: u32, keysym: u32, mac: u32) -> Key {
    if cfg!(target_os = "windows") {
        Key::Other(vk)
    } else if cfg!(target_os = "macos") {
        Key::Other(mac)
    } else {
        Key::Other(keysym)
    }
}

impl KeyCode {
    /// Resolve a single key name, case-insensitively. Aliases such as
    /// `esc`, `return` or `arrowup` are accepted.
    pub fn from_name(name: &str) -> Option<KeyCode> {
        let lower = name.trim().to_ascii_lowercase();
        let lower = match lower.strip_prefix("numpad") {
            Some(rest) if !rest.is_empty() => format!("num{rest}"),
            _ => lower,
        };
        let canonical = match lower.as_str() {
            "esc" => "escape",
            "return" => "enter",
            "del" => "delete",
            "ins" => "insert",
            "caps" => "capslock",
            "scroll" => "scrolllock",
            "pgup" => "pageup",
            "pgdn" => "pagedown",
            "arrowup" => "up",
            "arrowdown" => "down",
            "arrowleft" => "left",
            "arrowright" => "right",
            "semicolon" | "oem1" => ";",
            "equals" | "equal" | "oemplus" => "=",
            "comma" | "oemcomma" => ",",
            "minus" | "oemminus" => "-",
            "period" | "oemperiod" => ".",
            "slash" | "oem2" => "/",
            "grave" | "backquote" | "oem3" => "`",
            "bracketleft" | "oem4" => "[",
            "backslash" | "oem5" => "\\",
            "bracketright" | "oem6" => "]",
            "quote" | "oem7" => "'",
            "nummultiply" | "numstar" => "nummul",
            "numminus" | "numsubtract" => "numsub",
            "numplus" => "numadd",
            "numdecimal" => "numdot",
            "numslash" | "numdivide" => "numdiv",
            other => other,
        };
        KeyCode::ALL
            .iter()
            .copied()
            .find(|code| code.name().eq_ignore_ascii_case(canonical))
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the four standard modifiers. Ordering is the canonical display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Modifier {
    Ctrl,
    Alt,
    Shift,
    Super,
}

impl Modifier {
    pub fn name(self) -> &'static str {
        match self {
            Modifier::Ctrl => "Ctrl",
            Modifier::Alt => "Alt",
            Modifier::Shift => "Shift",
            Modifier::Super => "Super",
        }
    }

    fn from_name(name: &str) -> Option<Modifier> {
        match name.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "alt" | "option" => Some(Modifier::Alt),
            "shift" => Some(Modifier::Shift),
            "super" | "meta" | "win" | "cmd" | "command" => Some(Modifier::Super),
            _ => None,
        }
    }

    fn to_hotkey_modifiers(self) -> Modifiers {
        match self {
            Modifier::Ctrl => Modifiers::CONTROL,
            Modifier::Alt => Modifiers::ALT,
            Modifier::Shift => Modifiers::SHIFT,
            Modifier::Super => Modifiers::SUPER,
        }
    }
}

/// A key plus the set of modifiers held with it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub modifiers: BTreeSet<Modifier>,
    pub key: KeyCode,
}

impl KeyCombo {
    /// A combination with no modifiers.
    pub fn bare(key: KeyCode) -> Self {
        Self {
            modifiers: BTreeSet::new(),
            key,
        }
    }

    pub fn with_modifiers(key: KeyCode, modifiers: impl IntoIterator<Item = Modifier>) -> Self {
        Self {
            modifiers: modifiers.into_iter().collect(),
            key,
        }
    }

    /// Build the `global_hotkey` registration value.
    pub fn to_hotkey(&self) -> HotKey {
        let modifiers = self
            .modifiers
            .iter()
            .fold(Modifiers::empty(), |acc, m| acc | m.to_hotkey_modifiers());
        let modifiers = if modifiers.is_empty() {
            None
        } else {
            Some(modifiers)
        };
        HotKey::new(modifiers, self.key.to_hotkey_code())
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for modifier in &self.modifiers {
            write!(f, "{}+", modifier.name())?;
        }
        f.write_str(self.key.name())
    }
}

impl FromStr for KeyCombo {
    type Err = RepeaterError;

    fn from_str(s: &str) -> Result<Self> {
        parse_key_combo(s)
    }
}

/// Parse text such as `"Ctrl+Alt+S"` into a [`KeyCombo`].
///
/// Parts are separated by `+`, whitespace around parts is ignored and
/// matching is case-insensitive. Exactly one non-modifier key is required.
pub fn parse_key_combo(text: &str) -> Result<KeyCombo> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(RepeaterError::invalid_key_format(text, "empty key combination"));
    }

    let mut modifiers = BTreeSet::new();
    let mut key = None;

    for part in trimmed.split('+').map(str::trim) {
        if part.is_empty() {
            return Err(RepeaterError::invalid_key_format(
                text,
                "empty segment between '+' separators",
            ));
        }
        if let Some(modifier) = Modifier::from_name(part) {
            modifiers.insert(modifier);
            continue;
        }
        let code = KeyCode::from_name(part).ok_or_else(|| {
            RepeaterError::invalid_key_format(text, format!("unknown key '{part}'"))
        })?;
        if key.replace(code).is_some() {
            return Err(RepeaterError::invalid_key_format(
                text,
                "more than one non-modifier key",
            ));
        }
    }

    let key = key.ok_or_else(|| RepeaterError::invalid_key_format(text, "missing key"))?;
    Ok(KeyCombo { modifiers, key })
}

/// Parse a single key name with no modifiers, as used for the trigger key.
pub fn parse_key(text: &str) -> Result<KeyCode> {
    let combo = parse_key_combo(text)?;
    if !combo.modifiers.is_empty() {
        return Err(RepeaterError::invalid_key_format(
            text,
            "expected a single key without modifiers",
        ));
    }
    Ok(combo.key)
}

/// Canonical text for a key; inverse of [`parse_key_combo`] for bare keys.
pub fn encode_key_event(code: KeyCode) -> String {
    code.name().to_string()
}
