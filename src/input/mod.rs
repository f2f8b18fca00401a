mod shortcut;

pub use shortcut::{
    resolve_shortcut, InputContext, NudgeStep, ShortcutAction, ShortcutKey, ShortcutModifiers,
};
