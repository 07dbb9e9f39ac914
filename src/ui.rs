use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
};
use crate::app::{AnswerView, App, FocusPane, InputMode, PromptKind};
use crate::chat::ChatRole;
use crate::environment::Mode;
use crate::render::render_markdown;
use crate::solver::Field;

const SPINNER: [&str; 3] = ["◐", "◓", "◑"];

/// Furthest scroll offset that still fills `height` rows of a wrapped paragraph
fn max_scroll(paragraph: &Paragraph, width: u16, height: u16) -> u16 {
    let rows = paragraph.line_count(width.max(1));
    rows.saturating_sub(height as usize).min(u16::MAX as usize) as u16
}

/// Cursor (col, row) for a char index inside possibly multi-line text
fn cursor_offset(text: &str, cursor: usize) -> (u16, u16) {
    let before: String = text.chars().take(cursor).collect();
    let row = before.matches('\n').count();
    let col = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);
    (col as u16, row as u16)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let (main_area, chat_area) = if app.chat_visible {
        let [main, chat] = Layout::horizontal([
            Constraint::Percentage(62),
            Constraint::Percentage(38),
        ])
        .areas(body_area);
        (main, Some(chat))
    } else {
        (body_area, None)
    };

    let [form_area, answer_area] = Layout::horizontal([
        Constraint::Percentage(45),
        Constraint::Percentage(55),
    ])
    .areas(main_area);

    render_form(app, frame, form_area);
    render_answer(app, frame, answer_area);

    app.chat_area = chat_area;
    if let Some(chat_area) = chat_area {
        render_chat(app, frame, chat_area);
    }

    render_footer(app, frame, footer_area);

    // Render popups (in order of priority)
    if let Some(message) = app.alert.clone() {
        render_alert(frame, area, &message);
    } else if app.prompt.is_some() {
        render_prompt(app, frame, area);
    }
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let endpoint = app.client.endpoint();
    let mode = match endpoint.mode {
        Mode::Production => Span::styled(" proxy ", Style::default().fg(Color::Green)),
        Mode::Development if endpoint.api_key.is_some() => {
            Span::styled(" direct ", Style::default().fg(Color::Yellow))
        }
        Mode::Development => Span::styled(" direct · no API key ", Style::default().fg(Color::Red)),
    };

    let title = Line::from(vec![
        Span::styled(" Homework Helper ", Style::default().fg(Color::Cyan).bold()),
        mode,
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::Black));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match (app.focus, app.input_mode) {
        (FocusPane::Chat, _) => " CHAT ",
        (_, InputMode::Editing) => " EDIT ",
        (FocusPane::Answer, _) => " ANSWER ",
        (FocusPane::Form, _) => " FORM ",
    };

    let hints = match (app.focus, app.input_mode) {
        (FocusPane::Chat, _) => "Enter send · ↑↓ scroll · Tab form · Esc close",
        (_, InputMode::Editing) => "Esc done · Tab next field · Ctrl+S solve",
        (FocusPane::Answer, _) => "j/k scroll · y copy · Tab back · c chat · q quit",
        (FocusPane::Form, _) => {
            "j/k field · i edit · s solve · a image · r remove · y copy · c chat · K key · q quit"
        }
    };

    let footer = Line::from(vec![
        Span::styled(mode_text, mode_style),
        Span::raw(" "),
        Span::styled(hints, Style::default().fg(Color::DarkGray)),
    ]);
    frame.render_widget(Paragraph::new(footer), area);
}

fn field_height(field: Field) -> u16 {
    match field {
        Field::Question => 7,
        Field::Notes => 4,
        _ => 3,
    }
}

fn render_form(app: &App, frame: &mut Frame, area: Rect) {
    let form_focused = app.focus == FocusPane::Form;

    let mut constraints: Vec<Constraint> = Field::all()
        .iter()
        .map(|f| Constraint::Length(field_height(*f)))
        .collect();
    constraints.push(Constraint::Length(3)); // image
    constraints.push(Constraint::Length(3)); // submit
    constraints.push(Constraint::Min(0));
    let rows = Layout::vertical(constraints).split(area);

    for (i, field) in Field::all().into_iter().enumerate() {
        let selected = form_focused && app.field == field;
        let editing = selected && app.input_mode == InputMode::Editing;

        let border_color = if editing {
            Color::Yellow
        } else if selected {
            Color::Cyan
        } else {
            Color::DarkGray
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border_color))
            .title(format!(" {} ", field.label()));

        let value = app.solver.field(field);
        let body = if value.is_empty() && !editing {
            Text::from(Span::styled(placeholder(field), Style::default().fg(Color::DarkGray)))
        } else {
            Text::from(value.as_str())
        };

        let inner = block.inner(rows[i]);
        // Keep the cursor line in view for long multi-line input
        let (col, row) = cursor_offset(value, app.cursor);
        let scroll = if editing { row.saturating_sub(inner.height.saturating_sub(1)) } else { 0 };

        frame.render_widget(Paragraph::new(body).block(block).scroll((scroll, 0)), rows[i]);

        if editing {
            frame.set_cursor_position((
                inner.x + col.min(inner.width.saturating_sub(1)),
                inner.y + row - scroll,
            ));
        }
    }

    let image_line = match app.solver.image() {
        Some(image) => Line::from(vec![
            Span::styled(image.preview(), Style::default().fg(Color::Green)),
            Span::styled("  (r to remove)", Style::default().fg(Color::DarkGray)),
        ]),
        None => Line::from(Span::styled(
            "No image attached (a to attach)",
            Style::default().fg(Color::DarkGray),
        )),
    };
    let image = Paragraph::new(image_line)
        .block(Block::default().borders(Borders::ALL).title(" Image "));
    frame.render_widget(image, rows[Field::all().len()]);

    let (label, style) = if app.is_solving() {
        (
            format!(" {} Solving... ", SPINNER[app.animation_frame as usize % SPINNER.len()]),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        (" ➤ Solve (s) ".to_string(), Style::default().fg(Color::Black).bg(Color::Cyan).bold())
    };
    let submit = Paragraph::new(Line::from(Span::styled(label, style)).centered())
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(submit, rows[Field::all().len() + 1]);
}

fn placeholder(field: Field) -> &'static str {
    match field {
        Field::Question => "Type your homework question...",
        Field::Subject => "e.g. Mathematics",
        Field::Level => "e.g. High School",
        Field::Language => "e.g. English",
        Field::Notes => "Anything the tutor should know",
    }
}

fn render_answer(app: &mut App, frame: &mut Frame, area: Rect) {
    app.answer_area = Some(area);

    let focused = app.focus == FocusPane::Answer;
    let copy_hint = if app.copy_acknowledged() {
        Span::styled(" ✅ Copied ", Style::default().fg(Color::Green))
    } else {
        Span::styled(" 📋 y ", Style::default().fg(Color::DarkGray))
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(" Answer ")
        .title(Line::from(copy_hint).right_aligned());

    let text = match &app.answer {
        AnswerView::Hidden => Text::from(Span::styled(
            "Fill in the form and press s to solve.",
            Style::default().fg(Color::DarkGray),
        )),
        AnswerView::Loading => Text::from(Span::styled(
            format!("{} Working through the problem...", SPINNER[app.animation_frame as usize % SPINNER.len()]),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::ITALIC),
        )),
        AnswerView::Rendered(answer) => answer.text.clone(),
        AnswerView::Failed(message) => Text::from(Span::styled(
            message.clone(),
            Style::default().fg(Color::Red),
        )),
    };

    let answer = Paragraph::new(text).wrap(Wrap { trim: false });
    let inner = block.inner(area);
    app.answer_scroll = app.answer_scroll.min(max_scroll(&answer, inner.width, inner.height));

    let answer = answer.block(block).scroll((app.answer_scroll, 0));
    frame.render_widget(answer, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    let [history_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    let focused = app.focus == FocusPane::Chat;

    let mut lines: Vec<Line> = Vec::new();
    for msg in app.chat.transcript() {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                lines.extend(msg.text.lines().map(|l| Line::from(l.to_string())));
            }
            ChatRole::Ai => {
                lines.push(Line::from(Span::styled(
                    "Tutor:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                lines.extend(render_markdown(&msg.text).text.lines);
            }
        }
        lines.push(Line::default());
    }

    if app.chat.is_awaiting() {
        lines.push(Line::from(Span::styled(
            "Tutor:",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )));
        // Animated ellipsis: cycles through ".", "..", "..."
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        lines.push(Line::from(Span::styled(
            format!("typing{}", dots),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "Ask the tutor anything about your studies...",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let history_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Cyan } else { Color::DarkGray }))
        .title(" Study Chat ");
    let inner = history_block.inner(history_area);

    let history = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
    let bottom = max_scroll(&history, inner.width, inner.height);
    if app.chat_follow || app.chat_scroll > bottom {
        app.chat_scroll = bottom;
    }

    let history = history.block(history_block).scroll((app.chat_scroll, 0));
    frame.render_widget(history, history_area);

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { Color::Yellow } else { Color::DarkGray }))
        .title(" Message ");
    let inner = input_block.inner(input_area);
    frame.render_widget(Paragraph::new(app.chat_input.as_str()).block(input_block), input_area);

    if focused && app.prompt.is_none() && app.alert.is_none() {
        let col = app.chat_input.chars().take(app.chat_cursor).count() as u16;
        frame.set_cursor_position((inner.x + col.min(inner.width.saturating_sub(1)), inner.y));
    }
}

fn centered_popup(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}

fn render_alert(frame: &mut Frame, area: Rect, message: &str) {
    let popup_area = centered_popup(area, 60, 7);
    frame.render_widget(Clear, popup_area);

    let text = Text::from(vec![
        Line::from(message.to_string()),
        Line::default(),
        Line::from(Span::styled("Press Enter to dismiss", Style::default().fg(Color::DarkGray))),
    ]);
    let alert = Paragraph::new(text)
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Notice "),
        );
    frame.render_widget(alert, popup_area);
}

fn render_prompt(app: &App, frame: &mut Frame, area: Rect) {
    let Some(prompt) = &app.prompt else {
        return;
    };

    let (title, instructions) = match prompt.kind {
        PromptKind::ImagePath => (
            " Attach Image ",
            "Path to an image file. Enter to attach, Esc to cancel.",
        ),
        PromptKind::ApiKey => (
            " Gemini API Key ",
            "Paste your API key. Enter to save, Esc to cancel.",
        ),
    };

    let popup_area = centered_popup(area, 70, 7);
    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(title);
    let inner = block.inner(popup_area);
    frame.render_widget(block, popup_area);

    frame.render_widget(
        Paragraph::new(instructions).style(Style::default().fg(Color::DarkGray)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    // Mask the key with asterisks (show last 4 chars)
    let display_text = match prompt.kind {
        PromptKind::ApiKey => {
            let len = prompt.input.chars().count();
            if len <= 4 {
                "*".repeat(len)
            } else {
                let last_four: String = prompt.input.chars().skip(len - 4).collect();
                format!("{}{}", "*".repeat((len - 4).min(20)), last_four)
            }
        }
        PromptKind::ImagePath => prompt.input.clone(),
    };

    let input_area = Rect::new(inner.x, inner.y + 2, inner.width, 1);
    frame.render_widget(
        Paragraph::new(display_text).style(Style::default().fg(Color::Cyan)),
        input_area,
    );

    let col = match prompt.kind {
        PromptKind::ApiKey => prompt.input.chars().count().min(24),
        PromptKind::ImagePath => prompt.cursor,
    } as u16;
    frame.set_cursor_position((input_area.x + col.min(input_area.width.saturating_sub(1)), input_area.y));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use ratatui::{backend::TestBackend, Terminal};

    fn draw(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(140, 40)).unwrap();
        terminal.draw(|frame| render(app, frame)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|c| c.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_cursor_offset_multiline() {
        assert_eq!(cursor_offset("ab\ncde", 5), (2, 1));
        assert_eq!(cursor_offset("ab", 0), (0, 0));
    }

    #[test]
    fn test_rendered_answer_appears() {
        let mut app = App::new(Config::default());
        app.finish_solve(Ok("**FINAL ANSWER:** 42".to_string()));
        let screen = draw(&mut app);
        assert!(screen.contains("FINAL ANSWER: 42"));
        assert!(screen.contains("Answer"));
    }

    #[test]
    fn test_image_preview_and_chat_panel() {
        let mut app = App::new(Config::default());
        let screen = draw(&mut app);
        assert!(screen.contains("No image attached"));
        assert!(!screen.contains("Study Chat"));

        app.toggle_chat();
        let screen = draw(&mut app);
        assert!(screen.contains("Study Chat"));
        assert!(app.chat_area.is_some());
    }

    #[tokio::test]
    async fn test_attached_image_preview_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diagram.png");
        std::fs::write(&path, b"hello").unwrap();

        let mut app = App::new(Config::default());
        app.solver.attach_image(&path).await.unwrap();
        let screen = draw(&mut app);
        assert!(screen.contains("diagram.png (image/png, 5 B)"));
        assert!(!screen.contains("No image attached"));

        app.remove_image();
        let screen = draw(&mut app);
        assert!(!screen.contains("diagram.png"));
        assert!(screen.contains("No image attached"));
    }

    #[test]
    fn test_typing_placeholder_while_awaiting_reply() {
        let mut app = App::new(Config::default());
        app.toggle_chat();
        app.chat.submit("What is a prime number?").unwrap();

        let screen = draw(&mut app);
        assert!(screen.contains("What is a prime number?"));
        assert!(screen.contains("typing."));

        app.chat.complete(Ok("A number with exactly two divisors.".to_string()));
        let screen = draw(&mut app);
        assert!(!screen.contains("typing."));
        assert!(screen.contains("A number with exactly two divisors."));
    }

    #[test]
    fn test_long_chat_reply_tail_stays_reachable() {
        let mut app = App::new(Config::default());
        app.toggle_chat();
        app.chat.submit("Explain").unwrap();
        let reply = format!("{}ZZENDMARKER", "abcdefghijklmnopq ".repeat(400));
        app.chat.complete(Ok(reply));

        // Following the newest message shows the end of the reply
        let screen = draw(&mut app);
        assert!(screen.contains("ZZENDMARKER"));

        app.scroll_chat_up();
        let screen = draw(&mut app);
        assert!(!app.chat_follow);
        assert!(screen.contains("ZZENDMARKER"));

        for _ in 0..30 {
            app.scroll_chat_up();
        }
        let screen = draw(&mut app);
        assert!(!screen.contains("ZZENDMARKER"));

        // Scrolling far past the end settles on the last page
        for _ in 0..500 {
            app.scroll_chat_down();
        }
        let screen = draw(&mut app);
        assert!(screen.contains("ZZENDMARKER"));
    }

    #[test]
    fn test_answer_scroll_stops_at_last_page() {
        let mut app = App::new(Config::default());
        let steps: Vec<String> = (1..=120).map(|i| format!("Step {} of the working.", i)).collect();
        app.finish_solve(Ok(steps.join("\n\n")));

        for _ in 0..1000 {
            app.scroll_answer_down();
        }
        let screen = draw(&mut app);
        assert!(app.answer_scroll > 0);
        assert!(app.answer_scroll < 1000);
        assert!(screen.contains("Step 120 of the working."));

        // Scrolling back up starts from the clamped offset
        let clamped = app.answer_scroll;
        app.scroll_answer_up();
        draw(&mut app);
        assert_eq!(app.answer_scroll, clamped - 1);
    }

    #[test]
    fn test_alert_popup() {
        let mut app = App::new(Config::default());
        app.alert = Some("Please enter a question or upload an image.".to_string());
        let screen = draw(&mut app);
        assert!(screen.contains("Notice"));
        assert!(screen.contains("Press Enter to dismiss"));
    }
}
