#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutKey {
    Character(char),
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Tab,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShortcutModifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl ShortcutModifiers {
    pub const fn new(ctrl: bool, shift: bool, alt: bool) -> Self {
        Self {
            ctrl,
            shift,
            alt,
            meta: false,
        }
    }

    /// Ctrl on most platforms, Cmd on macOS.
    pub const fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputContext {
    /// A form field owns keyboard focus; the canvas must not react.
    pub text_field_focused: bool,
    pub editing_enabled: bool,
    pub drag_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NudgeStep {
    Default,
    Coarse,
    Fine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    Nudge { dx: i8, dy: i8, step: NudgeStep },
    CycleSlotForward,
    CycleSlotBackward,
    ViewZoomIn,
    ViewZoomOut,
    ViewReset,
    Undo,
    Redo,
    EnterSelectTool,
    EnterHandTool,
    EndDrag,
}

fn nudge_step(modifiers: ShortcutModifiers) -> NudgeStep {
    if modifiers.shift {
        NudgeStep::Coarse
    } else if modifiers.alt {
        NudgeStep::Fine
    } else {
        NudgeStep::Default
    }
}

fn resolve_nudge(key: ShortcutKey, modifiers: ShortcutModifiers) -> Option<ShortcutAction> {
    let (dx, dy) = match key {
        ShortcutKey::ArrowLeft => (-1, 0),
        ShortcutKey::ArrowRight => (1, 0),
        ShortcutKey::ArrowUp => (0, -1),
        ShortcutKey::ArrowDown => (0, 1),
        _ => return None,
    };
    Some(ShortcutAction::Nudge {
        dx,
        dy,
        step: nudge_step(modifiers),
    })
}

fn resolve_view_shortcut(key: ShortcutKey) -> Option<ShortcutAction> {
    match key {
        ShortcutKey::Character('+') | ShortcutKey::Character('=') => {
            Some(ShortcutAction::ViewZoomIn)
        }
        ShortcutKey::Character('-') | ShortcutKey::Character('_') => {
            Some(ShortcutAction::ViewZoomOut)
        }
        ShortcutKey::Character('0') => Some(ShortcutAction::ViewReset),
        _ => None,
    }
}

fn resolve_history_shortcut(
    key: ShortcutKey,
    modifiers: ShortcutModifiers,
) -> Option<ShortcutAction> {
    match (key, modifiers.shift) {
        (ShortcutKey::Character('z'), false) => Some(ShortcutAction::Undo),
        (ShortcutKey::Character('z'), true)
        | (ShortcutKey::Character('Z'), _)
        | (ShortcutKey::Character('y'), false) => Some(ShortcutAction::Redo),
        _ => None,
    }
}

fn resolve_editor_shortcut(
    key: ShortcutKey,
    modifiers: ShortcutModifiers,
) -> Option<ShortcutAction> {
    if modifiers.command() {
        return resolve_history_shortcut(key, modifiers);
    }
    match key {
        ShortcutKey::Tab if modifiers.shift => Some(ShortcutAction::CycleSlotBackward),
        ShortcutKey::Tab => Some(ShortcutAction::CycleSlotForward),
        ShortcutKey::Character('v') => Some(ShortcutAction::EnterSelectTool),
        ShortcutKey::Character('h') => Some(ShortcutAction::EnterHandTool),
        _ => resolve_nudge(key, modifiers).or_else(|| resolve_view_shortcut(key)),
    }
}

pub fn resolve_shortcut(
    key: ShortcutKey,
    modifiers: ShortcutModifiers,
    context: InputContext,
) -> Option<ShortcutAction> {
    if context.text_field_focused {
        return None;
    }

    if context.drag_active {
        return match key {
            ShortcutKey::Escape => Some(ShortcutAction::EndDrag),
            _ => None,
        };
    }

    if !context.editing_enabled {
        return resolve_view_shortcut(key).filter(|_| !modifiers.command());
    }

    resolve_editor_shortcut(key, modifiers)
}
