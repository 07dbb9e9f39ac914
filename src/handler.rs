use std::time::Instant;

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;

use crate::app::{App, FocusPane, InputMode, PromptKind};
use crate::solver::Field;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Shared line-editing keys. Returns false when the key was not an edit.
fn edit_text(text: &mut String, cursor: &mut usize, key: KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            if *cursor < text.chars().count() {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
        }
        KeyCode::Left => *cursor = cursor.saturating_sub(1),
        KeyCode::Right => *cursor = (*cursor + 1).min(text.chars().count()),
        KeyCode::Home => *cursor = 0,
        KeyCode::End => *cursor = text.chars().count(),
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => return false,
    }
    true
}

fn insert_str(text: &mut String, cursor: &mut usize, pasted: &str) {
    let byte_pos = char_to_byte_index(text, *cursor);
    text.insert_str(byte_pos, pasted);
    *cursor += pasted.chars().count();
}

fn is_ctrl(key: &KeyEvent, c: char) -> bool {
    key.code == KeyCode::Char(c) && key.modifiers.contains(KeyModifiers::CONTROL)
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Paste(text) => handle_paste(app, &text),
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick(Instant::now());
            app.poll_tasks().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global keys that work in any mode
    if is_ctrl(&key, 'c') {
        app.should_quit = true;
        return Ok(());
    }

    // Alerts are modal until dismissed
    if app.alert.is_some() {
        if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ')) {
            app.alert = None;
        }
        return Ok(());
    }

    if app.prompt.is_some() {
        return handle_prompt(app, key).await;
    }

    if app.focus == FocusPane::Chat && app.chat_visible {
        handle_chat(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key),
    }
    Ok(())
}

async fn handle_prompt(app: &mut App, key: KeyEvent) -> Result<()> {
    let Some(prompt) = app.prompt.as_mut() else {
        return Ok(());
    };

    match key.code {
        KeyCode::Esc => app.prompt = None,
        KeyCode::Enter => {
            if let Some(prompt) = app.prompt.take() {
                match prompt.kind {
                    PromptKind::ImagePath => {
                        if !prompt.input.trim().is_empty() {
                            app.attach_image(&prompt.input).await;
                        }
                    }
                    PromptKind::ApiKey => app.set_api_key(&prompt.input),
                }
            }
        }
        _ => {
            edit_text(&mut prompt.input, &mut prompt.cursor, key);
        }
    }
    Ok(())
}

fn handle_chat(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_chat(),
        KeyCode::Tab | KeyCode::BackTab => {
            app.focus = FocusPane::Form;
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => app.submit_chat(),
        KeyCode::Up => app.scroll_chat_up(),
        KeyCode::Down => app.scroll_chat_down(),
        KeyCode::PageUp => {
            for _ in 0..5 {
                app.scroll_chat_up();
            }
        }
        KeyCode::PageDown => {
            for _ in 0..5 {
                app.scroll_chat_down();
            }
        }
        _ => {
            edit_text(&mut app.chat_input, &mut app.chat_cursor, key);
        }
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    // Keys shared by the form and answer panes
    match key.code {
        KeyCode::Char('q') => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('s') => {
            app.submit_solver();
            return;
        }
        KeyCode::Char('y') => {
            app.copy_answer();
            return;
        }
        KeyCode::Char('c') => {
            app.toggle_chat();
            return;
        }
        KeyCode::Char('a') => {
            app.open_prompt(PromptKind::ImagePath);
            return;
        }
        KeyCode::Char('r') => {
            app.remove_image();
            return;
        }
        KeyCode::Char('K') => {
            app.open_prompt(PromptKind::ApiKey);
            return;
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            for _ in 0..10 {
                app.scroll_answer_down();
            }
            return;
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            for _ in 0..10 {
                app.scroll_answer_up();
            }
            return;
        }
        _ => {}
    }

    match app.focus {
        FocusPane::Form => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.focus_field(app.field.next()),
            KeyCode::Char('k') | KeyCode::Up => app.focus_field(app.field.prev()),
            KeyCode::Enter | KeyCode::Char('i') => {
                app.focus_field(app.field);
                app.input_mode = InputMode::Editing;
            }
            KeyCode::Tab => app.focus = FocusPane::Answer,
            _ => {}
        },
        FocusPane::Answer => match key.code {
            KeyCode::Char('j') | KeyCode::Down => app.scroll_answer_down(),
            KeyCode::Char('k') | KeyCode::Up => app.scroll_answer_up(),
            KeyCode::Char('g') => app.answer_scroll = 0,
            KeyCode::Tab if app.chat_visible => {
                app.focus = FocusPane::Chat;
                app.input_mode = InputMode::Editing;
            }
            KeyCode::Tab | KeyCode::Esc => app.focus = FocusPane::Form,
            _ => {}
        },
        // Chat keys are handled before we get here
        FocusPane::Chat => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent) {
    if is_ctrl(&key, 's') {
        app.submit_solver();
        return;
    }

    let field = app.field;
    match key.code {
        KeyCode::Esc => app.input_mode = InputMode::Normal,
        KeyCode::Tab => app.focus_field(field.next()),
        KeyCode::BackTab => app.focus_field(field.prev()),
        // Question and notes are multi-line; Enter finishes the other fields
        KeyCode::Enter => match field {
            Field::Question | Field::Notes => {
                insert_str(app.solver.field_mut(field), &mut app.cursor, "\n");
            }
            _ => {
                app.input_mode = InputMode::Normal;
                app.focus_field(field.next());
            }
        },
        _ => {
            edit_text(app.solver.field_mut(field), &mut app.cursor, key);
        }
    }
}

fn handle_paste(app: &mut App, text: &str) {
    if let Some(prompt) = app.prompt.as_mut() {
        // Paths and keys are single-line
        let line = text.lines().next().unwrap_or_default();
        insert_str(&mut prompt.input, &mut prompt.cursor, line);
    } else if app.focus == FocusPane::Chat && app.chat_visible {
        insert_str(&mut app.chat_input, &mut app.chat_cursor, &text.replace('\n', " "));
    } else if app.input_mode == InputMode::Editing {
        let field = app.field;
        insert_str(app.solver.field_mut(field), &mut app.cursor, text);
    }
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_visible && app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let in_answer = app.answer_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            for _ in 0..3 {
                if in_chat {
                    app.scroll_chat_down();
                } else if in_answer {
                    app.scroll_answer_down();
                }
            }
        }
        MouseEventKind::ScrollUp => {
            for _ in 0..3 {
                if in_chat {
                    app.scroll_chat_up();
                } else if in_answer {
                    app.scroll_answer_up();
                }
            }
        }
        _ => {}
    }
}
