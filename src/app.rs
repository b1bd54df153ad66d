//! ## Interactive Application
//!
//! Drives the [menu](crate::menu) against a [`SessionManager`]: renders the
//! current menu, reads the operator's choice, applies the transition and
//! carries out its effect.
//!
//! Device communication errors are printed and the loop goes on. The loop
//! ends when the operator exits or the input is closed.
//!

use std::io::{self, BufRead, Write};

use tracing::info;

use crate::acquisition::{self, preset_points, SweepOutcome};
use crate::console::{Console, OUT_OF_RANGE};
use crate::constants::{limits, scpi};
use crate::error::Error;
use crate::export::TraceExporter;
use crate::menu::{self, Effect, MenuState};
use crate::session::{Identification, SessionManager};
use crate::transport::Transport;
use crate::types::ExchangeResult;

const TRUNCATION_WARNING: &str =
    "Warning: No termination character or END indicator received. Increase read bytes to fix.";

pub struct App<T: Transport, E, R, W> {
    sessions: SessionManager<T>,
    exporter: E,
    console: Console<R, W>,
    state: MenuState,
}

impl<T, E, R, W> App<T, E, R, W>
where
    T: Transport,
    E: TraceExporter,
    R: BufRead,
    W: Write,
{
    /// Starts in resource selection.
    pub fn new(sessions: SessionManager<T>, exporter: E, console: Console<R, W>) -> Self {
        App {
            sessions,
            exporter,
            console,
            state: MenuState::ResourceSelect,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn sessions(&self) -> &SessionManager<T> {
        &self.sessions
    }

    pub fn into_parts(self) -> (SessionManager<T>, Console<R, W>) {
        (self.sessions, self.console)
    }

    /// ### Run
    ///
    /// Loop until the operator exits or input runs out, then close the session.
    ///
    pub fn run(&mut self) -> io::Result<()> {
        if self.sessions.catalog().is_empty() {
            writeln!(self.console.out(), "No instruments or other resources found.")?;
            return Ok(());
        }

        loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    info!("operator input closed");
                    break;
                }
                Err(err) => return Err(err),
            }
        }

        self.sessions.close();
        writeln!(self.console.out(), "Closing program.")?;
        Ok(())
    }

    /// Render the current menu and handle one choice. `false` means exit.
    fn step(&mut self) -> io::Result<bool> {
        self.render()?;

        let choice = self.console.read_integer("")?;
        let catalog_len = self.sessions.catalog().len();
        let (next, effect) = match menu::transition(self.state, choice, catalog_len) {
            Ok(transition) => transition,
            Err(_) => {
                writeln!(self.console.out(), "{OUT_OF_RANGE}")?;
                return Ok(true);
            }
        };
        self.state = next;

        match effect {
            Effect::None => {}
            Effect::Exit => return Ok(false),
            Effect::CloseSession => self.sessions.close(),
            Effect::OpenResource(index) => self.open(index)?,
            Effect::Identify => {
                writeln!(self.console.out(), "Sending {} to the device...", self.sessions.config().identify_command)?;
                let result = self.sessions.exchange().and_then(|mut exchange| exchange.identify());
                self.report_read(result)?;
                self.console.pause()?;
            }
            Effect::Query => {
                let command = self.console.prompt_line("Enter SCPI command to send.")?;
                writeln!(self.console.out(), "Sending {command} to the device...")?;
                let result = self.sessions.exchange().and_then(|mut exchange| exchange.query(&command));
                self.report_read(result)?;
                self.console.pause()?;
            }
            Effect::Write => {
                let command = self.console.prompt_line("Enter SCPI command to send.")?;
                writeln!(self.console.out(), "Sending {command} to the device...")?;
                match self.sessions.exchange().and_then(|mut exchange| exchange.write(&command)) {
                    Ok(written) => writeln!(self.console.out(), "{} bytes written.", written.bytes_written)?,
                    Err(err) => self.report_error(&err)?,
                }
                self.console.pause()?;
            }
            Effect::Read => {
                let result = self.sessions.exchange().and_then(|mut exchange| exchange.read());
                self.report_read(result)?;
                self.console.pause()?;
            }
            Effect::SetTimeout => {
                self.set_timeout()?;
                self.console.pause()?;
            }
            Effect::SetReadBytes => {
                self.set_read_bytes()?;
                self.console.pause()?;
            }
            Effect::CatalogMemory => {
                writeln!(self.console.out(), "Return format: <mem_used>, <mem_free>, <file_listing>")?;
                writeln!(
                    self.console.out(),
                    "Where <file_listing> is <file_name>, <file_size> for each file in the directory."
                )?;
                let result = self
                    .sessions
                    .exchange()
                    .and_then(|mut exchange| exchange.query(scpi::MEMORY_CATALOG));
                self.report_read(result)?;
            }
            Effect::SaveTrace => {
                self.save_trace()?;
                self.console.pause()?;
            }
        }

        Ok(true)
    }

    fn render(&mut self) -> io::Result<()> {
        let out = self.console.out();
        match self.state {
            MenuState::MainMenu => writeln!(out, "{}", menu::MAIN_MENU),
            MenuState::Memory => writeln!(out, "{}", menu::MEMORY_MENU),
            MenuState::ResourceSelect => {
                let catalog = self.sessions.catalog();
                writeln!(
                    out,
                    "{} instruments, serial ports, and other resources found:\n",
                    catalog.len()
                )?;
                for (index, resource) in catalog.iter() {
                    writeln!(out, "{index:3} --- {resource}")?;
                }
                writeln!(out, "\nPlease enter a resource index to open:")
            }
        }
    }

    fn open(&mut self, index: usize) -> io::Result<()> {
        let resource = self.sessions.catalog()[index].clone();
        writeln!(self.console.out(), "\n ------------------------------------- ")?;
        writeln!(self.console.out(), "Opening session to resource {resource}")?;

        match self.sessions.open(index) {
            Ok(Identification::Identified(identity)) => writeln!(self.console.out(), "{identity}"),
            Ok(Identification::Failed(err)) => {
                self.report_error(&err)?;
                writeln!(
                    self.console.out(),
                    "The device did not identify itself; the session stays open."
                )
            }
            Err(err) => {
                self.state = MenuState::ResourceSelect;
                self.report_error(&err)
            }
        }
    }

    fn set_timeout(&mut self) -> io::Result<()> {
        let prompt = format!(
            "Enter desired timeout in milliseconds between {} and {}. Default: {}",
            limits::TIMEOUT_MIN_MS,
            limits::TIMEOUT_MAX_MS,
            self.sessions.config().default_timeout_ms
        );
        let ms = self.console.read_int(
            &prompt,
            i64::from(limits::TIMEOUT_MIN_MS),
            i64::from(limits::TIMEOUT_MAX_MS),
        )?;

        // bounds were enforced by read_int
        match self.sessions.set_timeout(ms as u32) {
            Ok(()) => writeln!(
                self.console.out(),
                "New timeout value: {:.3} seconds",
                ms as f64 / 1000.0
            ),
            Err(err) => self.report_error(&err),
        }
    }

    fn set_read_bytes(&mut self) -> io::Result<()> {
        let prompt = format!(
            "Enter number of bytes to read between 1 and {}. Default: {}",
            limits::MAX_READ_BYTES,
            self.sessions.config().default_read_bytes
        );
        let bytes = self.console.read_int(&prompt, 1, limits::MAX_READ_BYTES as i64)?;

        match self.sessions.set_read_budget(bytes as usize) {
            Ok(()) => writeln!(self.console.out(), "Read bytes set to {bytes}."),
            Err(err) => self.report_error(&err),
        }
    }

    fn select_points(&mut self) -> io::Result<u32> {
        writeln!(self.console.out(), "Select number of points:")?;
        for (choice, points) in limits::SWEEP_POINT_PRESETS.iter().enumerate() {
            writeln!(self.console.out(), "{choice}: {points}")?;
        }
        let custom = limits::SWEEP_POINT_PRESETS.len();
        writeln!(self.console.out(), "{custom}: Custom")?;

        let choice = self.console.read_int("", 0, custom as i64)?;
        if let Some(points) = preset_points(choice as usize) {
            return Ok(points);
        }

        let prompt = format!(
            "Enter number of points between {} and {}.",
            limits::SWEEP_POINTS_MIN,
            limits::SWEEP_POINTS_MAX
        );
        let points = self.console.read_int(
            &prompt,
            i64::from(limits::SWEEP_POINTS_MIN),
            i64::from(limits::SWEEP_POINTS_MAX),
        )?;
        Ok(points as u32)
    }

    fn save_trace(&mut self) -> io::Result<()> {
        let points = self.select_points()?;
        writeln!(self.console.out(), "Capturing {points} points...")?;

        let outcome = match self.sessions.exchange() {
            Ok(mut exchange) => acquisition::marker_sweep(&mut exchange, points, &self.exporter),
            Err(err) => SweepOutcome::Aborted(err),
        };

        match outcome {
            SweepOutcome::Completed { trace, saved_to } => {
                if !trace.failed.is_empty() {
                    writeln!(
                        self.console.out(),
                        "{} of {} points could not be read.",
                        trace.failed.len(),
                        trace.point_count()
                    )?;
                }
                match saved_to {
                    Some(path) => writeln!(self.console.out(), "Trace saved to {}", path.display()),
                    None => writeln!(self.console.out(), "Trace captured but could not be saved."),
                }
            }
            SweepOutcome::Aborted(err) => self.report_error(&err),
        }
    }

    fn report_read(&mut self, result: Result<ExchangeResult, Error>) -> io::Result<()> {
        let response = match result {
            Ok(response) => response,
            Err(err) => return self.report_error(&err),
        };

        let out = self.console.out();
        if response.is_truncated() {
            writeln!(out, "{TRUNCATION_WARNING}\n")?;
        }
        writeln!(out, "{} bytes returned:", response.byte_count())?;
        writeln!(out, "{}", response.text())
    }

    fn report_error(&mut self, err: &Error) -> io::Result<()> {
        let out = self.console.out();
        match err.status_code() {
            Some(code) => writeln!(out, "Error code 0x{code:X}. {err}"),
            None => writeln!(out, "Error: {err}"),
        }
    }
}
