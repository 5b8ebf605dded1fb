use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{FunctionError, TableError};

use super::duration::parse_duration;
use super::function::{Call, Function, FunctionTable, Step};

/// Что нативные действия "показали" пользователю.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Say(String),
    Clear,
}

/// Общий журнал вывода. Хост читает его, скрипт пишет.
#[derive(Debug, Clone, Default)]
pub struct Transcript(Arc<Mutex<Vec<Output>>>);

impl Transcript {
    pub fn push(&self, output: Output) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).push(output);
    }

    /// Забирает накопленный вывод.
    pub fn drain(&self) -> Vec<Output> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn lines(&self) -> Vec<Output> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[derive(Debug, Clone, Copy)]
pub enum NativeType {
    Clear,
    Say,
    Set,
    WaitForTime,
    WaitForInput,
}

impl NativeType {
    pub fn all() -> Vec<Self> {
        vec![
            Self::Clear,
            Self::Say,
            Self::Set,
            Self::WaitForTime,
            Self::WaitForInput,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::Say => "say",
            Self::Set => "set",
            Self::WaitForTime => "waitForTime",
            Self::WaitForInput => "waitForInput",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "clear the display",
            Self::Say => "show text: say(text=...)",
            Self::Set => "assign a variable: set(name='x', value=...)",
            Self::WaitForTime => "wait for a duration: waitForTime(duration=5m)",
            Self::WaitForInput => "wait until the host delivers input: waitForInput(prompt=...)",
        }
    }
}

/// Таблица с нативными действиями, пишущими в `transcript`.
pub fn standard_library(transcript: &Transcript) -> Result<FunctionTable, TableError> {
    let mut table = FunctionTable::new();
    for native in NativeType::all() {
        let out = transcript.clone();
        match native {
            NativeType::Clear => table.register(native.name(), move || Clear { out: out.clone() })?,
            NativeType::Say => table.register(native.name(), move || Say { out: out.clone() })?,
            NativeType::Set => table.register(native.name(), || Set)?,
            NativeType::WaitForTime => table.register(native.name(), WaitForTime::default)?,
            NativeType::WaitForInput => {
                table.register(native.name(), move || WaitForInput { out: out.clone() })?
            }
        };
    }
    Ok(table)
}

pub struct Clear {
    out: Transcript,
}

impl Function for Clear {
    fn start(&mut self, _call: &mut Call<'_>) -> Result<Step, FunctionError> {
        self.out.push(Output::Clear);
        Ok(Step::Done)
    }
}

pub struct Say {
    out: Transcript,
}

impl Function for Say {
    fn start(&mut self, call: &mut Call<'_>) -> Result<Step, FunctionError> {
        let text = call.args.require("text")?;
        debug!(node = call.node, text, "say");
        self.out.push(Output::Say(text.to_string()));
        Ok(Step::Done)
    }
}

/// Присваивает ближайшей видимой переменной; если ее нет, объявляет в текущей области.
pub struct Set;

impl Function for Set {
    fn start(&mut self, call: &mut Call<'_>) -> Result<Step, FunctionError> {
        let name = call.args.require("name")?;
        let value = call.args.require("value")?;
        if !call.variables.set(name, value) {
            call.variables
                .add(name)
                .map_err(|err| FunctionError::new(err.to_string()))?
                .set(value);
        }
        Ok(Step::Done)
    }
}

/// Ждет по собственным часам; каждое `resume` сверяется с дедлайном.
#[derive(Default)]
pub struct WaitForTime {
    deadline: Option<Instant>,
}

impl WaitForTime {
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn check(&self) -> Step {
        match self.remaining() {
            Some(left) if !left.is_zero() => Step::Wait,
            _ => Step::Done,
        }
    }
}

impl Function for WaitForTime {
    fn start(&mut self, call: &mut Call<'_>) -> Result<Step, FunctionError> {
        let text = call.args.require("duration")?;
        let duration = parse_duration(text)
            .ok_or_else(|| FunctionError::new(format!("invalid duration '{text}'")))?;
        debug!(node = call.node, ?duration, "waiting for time");
        self.deadline = Some(Instant::now() + duration);
        Ok(self.check())
    }

    fn resume(&mut self, _call: &mut Call<'_>) -> Result<Step, FunctionError> {
        Ok(self.check())
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }
}

/// Ждет, пока хост не передаст ввод (обычно в переменную `input`) и не вызовет `resume`.
pub struct WaitForInput {
    out: Transcript,
}

impl Function for WaitForInput {
    fn start(&mut self, call: &mut Call<'_>) -> Result<Step, FunctionError> {
        if let Some(prompt) = call.args.text("prompt") {
            self.out.push(Output::Say(prompt.to_string()));
        }
        Ok(Step::Wait)
    }

    fn resume(&mut self, _call: &mut Call<'_>) -> Result<Step, FunctionError> {
        Ok(Step::Done)
    }
}
