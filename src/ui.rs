use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use fee_registry::{
    format_currency, FeeStatus, RegistryGateway, StudentFeeReport, StudentStatusRow,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Students,
    Defaulters,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::Students => Page::Defaulters,
            Page::Defaulters => Page::Students,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::Students => "Students",
            Page::Defaulters => "Defaulters",
        }
    }
}

pub struct App {
    gateway: RegistryGateway,
    today: NaiveDate,
    pub students: Vec<StudentStatusRow>,
    pub defaulters: Vec<StudentStatusRow>,
    pub state: TableState,
    pub defaulters_state: TableState,
    pub current_page: Page,
    pub show_detail: bool,
    pub detail: Option<StudentFeeReport>,
    pub message: Option<String>,
}

impl App {
    pub fn new(gateway: RegistryGateway, today: NaiveDate) -> Result<Self> {
        let students = gateway.all_students_with_status(&today)?;
        let defaulters = students
            .iter()
            .filter(|row| row.status.is_defaulter())
            .cloned()
            .collect::<Vec<_>>();

        let mut state = TableState::default();
        if !students.is_empty() {
            state.select(Some(0));
        }
        let mut defaulters_state = TableState::default();
        if !defaulters.is_empty() {
            defaulters_state.select(Some(0));
        }

        Ok(Self {
            gateway,
            today,
            students,
            defaulters,
            state,
            defaulters_state,
            current_page: Page::Students,
            show_detail: false,
            detail: None,
            message: None,
        })
    }

    fn current_rows(&self) -> &[StudentStatusRow] {
        match self.current_page {
            Page::Students => &self.students,
            Page::Defaulters => &self.defaulters,
        }
    }

    fn current_state(&mut self) -> &mut TableState {
        match self.current_page {
            Page::Students => &mut self.state,
            Page::Defaulters => &mut self.defaulters_state,
        }
    }

    pub fn selected(&self) -> Option<&StudentStatusRow> {
        let selected = match self.current_page {
            Page::Students => self.state.selected(),
            Page::Defaulters => self.defaulters_state.selected(),
        };
        selected.and_then(|i| self.current_rows().get(i))
    }

    /// Enter: open the breakdown for the selected student, or close it
    pub fn toggle_detail(&mut self) {
        if self.show_detail {
            self.show_detail = false;
            self.detail = None;
            return;
        }

        let Some(reg) = self.selected().map(|row| row.student.reg_number.clone()) else {
            return;
        };

        match self.gateway.student_report(&reg, &self.today) {
            Ok(report) => {
                self.detail = Some(report);
                self.show_detail = true;
                self.message = None;
            }
            Err(e) => self.message = Some(format!("Could not load {}: {}", reg, e)),
        }
    }

    pub fn next_page(&mut self) {
        self.current_page = self.current_page.next();
        self.show_detail = false;
        self.detail = None;
    }

    pub fn next(&mut self) {
        let len = self.current_rows().len();
        if len == 0 {
            return;
        }
        let state = self.current_state();
        let i = match state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        state.select(Some(i));
        self.refresh_detail();
    }

    pub fn previous(&mut self) {
        let len = self.current_rows().len();
        if len == 0 {
            return;
        }
        let state = self.current_state();
        let i = match state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        state.select(Some(i));
        self.refresh_detail();
    }

    /// Keep an open panel in sync with the selection
    fn refresh_detail(&mut self) {
        if self.show_detail {
            self.show_detail = false;
            self.toggle_detail();
        }
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                KeyCode::Enter => app.toggle_detail(),
                KeyCode::Tab => app.next_page(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.show_detail {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);

        render_table(f, content_chunks[0], app);
        render_detail_panel(f, content_chunks[1], app);
    } else {
        render_table(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn status_color(status: FeeStatus) -> Color {
    match status {
        FeeStatus::Paid => Color::Green,
        FeeStatus::Defaulter => Color::Red,
        FeeStatus::NotApplicable => Color::DarkGray,
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let mut tab_spans = vec![];
    for (i, page) in [Page::Students, Page::Defaulters].iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    let period = app.gateway.engine().calendar().current_period(&app.today);
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(period.to_string(), Style::default().fg(Color::Cyan)));
    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Students: {}", app.students.len()),
        Style::default().fg(Color::White),
    ));
    tab_spans.push(Span::raw("  "));
    tab_spans.push(Span::styled(
        format!("Owing: {}", app.defaulters.len()),
        Style::default().fg(Color::Red),
    ));

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn render_table(f: &mut Frame, area: Rect, app: &mut App) {
    let header_cells = ["Reg No.", "Name", "Class", "Admitted", "Status"]
        .iter()
        .map(|h| {
            Cell::from(*h).style(
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            )
        });

    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let rows: Vec<Row> = app
        .current_rows()
        .iter()
        .map(|row| {
            Row::new(vec![
                Cell::from(row.student.reg_number.clone()),
                Cell::from(truncate(&row.student.name, 28)),
                Cell::from(row.student.class.clone()),
                Cell::from(row.student.admission_date.to_string()),
                Cell::from(row.status.label())
                    .style(Style::default().fg(status_color(row.status))),
            ])
            .height(1)
        })
        .collect();

    let title = format!(" {} ", app.current_page.title());
    let table = Table::new(
        rows,
        [
            Constraint::Length(14),
            Constraint::Length(30),
            Constraint::Length(12),
            Constraint::Length(12),
            Constraint::Length(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White))
            .title(title),
    )
    .highlight_style(
        Style::default()
            .bg(Color::DarkGray)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("→ ");

    match app.current_page {
        Page::Students => f.render_stateful_widget(table, area, &mut app.state),
        Page::Defaulters => f.render_stateful_widget(table, area, &mut app.defaulters_state),
    }
}

fn render_detail_panel(f: &mut Frame, area: Rect, app: &App) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow))
        .title(" Fee Breakdown ");

    let Some(report) = &app.detail else {
        f.render_widget(Paragraph::new("  No student selected").block(block), area);
        return;
    };

    let label = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let mut content = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled("  Student: ", label),
            Span::raw(format!("{} ({})", report.student.name, report.student.reg_number)),
        ]),
        Line::from(vec![
            Span::styled("  Class: ", label),
            Span::raw(report.student.class.clone()),
        ]),
        Line::from(vec![
            Span::styled("  Current: ", label),
            Span::styled(
                format!("{} - {}", report.current_period, report.current_status.label()),
                Style::default().fg(status_color(report.current_status)),
            ),
        ]),
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(""),
    ];

    for entry in &report.breakdown {
        content.push(Line::from(vec![
            Span::styled(format!("  {:<24}", entry.period.to_string()), label),
            Span::styled(
                format!("{:<10}", entry.status.label()),
                Style::default().fg(status_color(entry.status)),
            ),
        ]));
        content.push(Line::from(format!(
            "    expected {}  paid {}  outstanding {}",
            format_currency(entry.expected_amount),
            format_currency(entry.paid_amount),
            format_currency(entry.outstanding_amount)
        )));
    }

    content.extend([
        Line::from(""),
        Line::from("  ─────────────────────────────────────"),
        Line::from(vec![
            Span::styled("  Total outstanding: ", label),
            Span::styled(
                format_currency(report.total_outstanding),
                Style::default().fg(if report.total_outstanding > rust_decimal::Decimal::ZERO {
                    Color::Red
                } else {
                    Color::Green
                }),
            ),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "  Press Enter to close",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        )),
    ]);

    f.render_widget(Paragraph::new(content).block(block), area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = vec![];

    if let Some(message) = &app.message {
        status_spans.push(Span::styled(message.clone(), Style::default().fg(Color::Red)));
        status_spans.push(Span::raw("  │  "));
    }

    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" breakdown  "));
    status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" page  "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" move  "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" quit"));

    let status_bar = Paragraph::new(Line::from(status_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
