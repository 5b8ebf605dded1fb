use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{FunctionError, TableError};
use crate::ir::ast::Node;

use super::variable::VariableTable;
use super::{Named, named_list};

/// Что функция сообщает движку после start/resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Действие завершено, движок переходит к следующему узлу.
    Done,
    /// Действие ждет внешнего события; движок останавливается до `resume`.
    Wait,
}

/// Значение аргумента после разрешения ссылок.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    Constant(String),
    Resource { name: String, value: Option<String> },
    Variable { name: String, value: Option<String> },
}

impl ArgumentValue {
    /// Текстовое значение; `None` у объявленной, но не заданной переменной.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Constant(text) => Some(text),
            Self::Resource { value, .. } | Self::Variable { value, .. } => value.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Arguments {
    entries: Vec<(String, ArgumentValue)>,
}

impl Arguments {
    pub fn new(entries: Vec<(String, ArgumentValue)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ArgumentValue> {
        self.entries.iter().find(|(arg, _)| arg == name).map(|(_, value)| value)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ArgumentValue::text)
    }

    pub fn require(&self, name: &str) -> Result<&str, FunctionError> {
        self.text(name).ok_or_else(|| FunctionError::missing_argument(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgumentValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Контекст одного вызова: узел, аргументы и текущая область переменных.
pub struct Call<'s> {
    pub node: usize,
    pub name: &'s str,
    pub args: &'s Arguments,
    pub variables: &'s mut VariableTable,
}

/// Нативное действие. Один экземпляр живет от `start` до завершения вызова,
/// поэтому состояние ожидания (таймер, слушатель ввода) хранится в нем.
pub trait Function: Send {
    fn start(&mut self, call: &mut Call<'_>) -> Result<Step, FunctionError>;

    fn resume(&mut self, _call: &mut Call<'_>) -> Result<Step, FunctionError> {
        Ok(Step::Done)
    }

    /// Скрипт отменен, пока функция ждала.
    fn cancel(&mut self) {}
}

/// Создает новый экземпляр функции на каждый вызов.
pub trait FunctionFactory: Send + Sync {
    fn create(&self) -> Box<dyn Function>;
}

impl<F, T> FunctionFactory for F
where
    F: Fn() -> T + Send + Sync,
    T: Function + 'static,
{
    fn create(&self) -> Box<dyn Function> {
        Box::new(self())
    }
}

pub enum Implementation<'a> {
    Native(&'a dyn FunctionFactory),
    /// Тело пользовательской функции: шаги - дети узла.
    Composed(&'a Node),
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Node>,
    #[serde(skip)]
    pub native: Option<Arc<dyn FunctionFactory>>,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), definition: None, native: None }
    }

    pub fn native(name: impl Into<String>, factory: impl FunctionFactory + 'static) -> Self {
        Self { native: Some(Arc::new(factory)), ..Self::new(name) }
    }

    pub fn composed(name: impl Into<String>, body: Node) -> Self {
        Self { definition: Some(body), ..Self::new(name) }
    }

    /// Нативная реализация имеет приоритет над телом.
    pub fn implementation(&self) -> Option<Implementation<'_>> {
        match (&self.native, &self.definition) {
            (Some(factory), _) => Some(Implementation::Native(factory.as_ref())),
            (None, Some(body)) => Some(Implementation::Composed(body)),
            (None, None) => None,
        }
    }
}

impl Named for FunctionDefinition {
    fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for FunctionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDefinition")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .field("native", &self.native.is_some())
            .finish()
    }
}

/// Таблица функций блока. Корень с нативными действиями обычно общий для
/// нескольких скриптов и после публикации в `Arc` не меняется.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Arc<FunctionTable>>,
    #[serde(with = "named_list")]
    pub functions: BTreeMap<String, FunctionDefinition>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(functions: impl IntoIterator<Item = FunctionDefinition>) -> Self {
        let functions = functions.into_iter().map(|def| (def.name.clone(), def)).collect();
        Self { parent: None, functions }
    }

    pub fn with_parent(parent: Arc<FunctionTable>) -> Self {
        Self { parent: Some(parent), functions: BTreeMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDefinition> {
        match self.functions.get(name) {
            Some(def) => Some(def),
            None => self.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    pub fn add(&mut self, name: &str) -> Result<&mut FunctionDefinition, TableError> {
        self.insert(FunctionDefinition::new(name))
    }

    pub fn insert(&mut self, def: FunctionDefinition) -> Result<&mut FunctionDefinition, TableError> {
        if self.functions.contains_key(&def.name) {
            return Err(TableError::DuplicateFunction(def.name));
        }
        Ok(self.functions.entry(def.name.clone()).or_insert(def))
    }

    pub fn register(
        &mut self,
        name: &str,
        factory: impl FunctionFactory + 'static,
    ) -> Result<&mut FunctionDefinition, TableError> {
        self.insert(FunctionDefinition::native(name, factory))
    }

    pub fn define(&mut self, name: &str, body: Node) -> Result<&mut FunctionDefinition, TableError> {
        self.insert(FunctionDefinition::composed(name, body))
    }

    /// Все видимые имена, ближайшая область первой.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        if let Some(parent) = &self.parent {
            names.extend(parent.names().into_iter().filter(|name| !self.functions.contains_key(*name)));
        }
        names
    }

    pub fn definitions(&self) -> impl Iterator<Item = &FunctionDefinition> {
        self.functions.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use pretty_assertions::assert_eq;

    struct Noop;

    impl Function for Noop {
        fn start(&mut self, _call: &mut Call<'_>) -> Result<Step, FunctionError> {
            Ok(Step::Done)
        }
    }

    #[test]
    fn get_walks_parents() {
        let base = Arc::new(FunctionTable::with([FunctionDefinition::new("wait")]));
        let mut child = FunctionTable::with_parent(Arc::clone(&base));
        child.add("doCheck").unwrap();

        let cases = [
            ("nothing", false, &*base),
            ("wait", true, &*base),
            ("wait", true, &child),
            ("doCheck", true, &child),
            ("neither", false, &child),
        ];
        for (name, exists, table) in cases {
            assert_eq!(table.get(name).is_some(), exists, "looking up {name}");
        }
    }

    #[test]
    fn add_rejects_local_duplicates() {
        let mut table = FunctionTable::with([FunctionDefinition::new("wait")]);
        assert!(table.add("doCheck").is_ok());
        assert_eq!(table.add("wait").unwrap_err(), TableError::DuplicateFunction("wait".into()));

        let mut child = FunctionTable::with_parent(Arc::new(table));
        assert!(child.register("wait", || Noop).is_ok());
        assert!(matches!(
            child.get("wait").and_then(FunctionDefinition::implementation),
            Some(Implementation::Native(_))
        ));
    }

    #[test]
    fn serializes_sorted_list() {
        let mut table = FunctionTable::new();
        table.add("wait").unwrap();
        table.register("show", || Noop).unwrap();
        table.add("repeat").unwrap();

        let json = serde_json::to_string(&table.functions.values().collect::<Vec<_>>()).unwrap();
        assert_eq!(json, r#"[{"name":"repeat"},{"name":"show"},{"name":"wait"}]"#);
        assert_eq!(
            serde_json::to_string(&table).unwrap(),
            r#"{"functions":[{"name":"repeat"},{"name":"show"},{"name":"wait"}]}"#
        );
    }

    #[test]
    fn round_trips_composed_definition() {
        let body = parser::parse("greet():\n  say(text=&who)").unwrap().remove(0);
        let mut table = FunctionTable::new();
        table.define("greet", body.clone()).unwrap();

        let json = serde_json::to_string(&table).unwrap();
        let back: FunctionTable = serde_json::from_str(&json).unwrap();
        // байтовые смещения в JSON не попадают, сравниваем форму дерева
        let restored = back.get("greet").and_then(|def| def.definition.as_ref());
        assert_eq!(restored.map(Node::to_string), Some(body.to_string()));
        assert_eq!(restored.map(|node| node.token.as_ref().map(|t| t.line())), Some(Some(0)));
    }

    #[test]
    fn names_prefer_nearest_scope() {
        let base = Arc::new(FunctionTable::with([
            FunctionDefinition::new("say"),
            FunctionDefinition::new("clear"),
        ]));
        let mut child = FunctionTable::with_parent(base);
        child.add("say").unwrap();
        child.add("beep").unwrap();
        assert_eq!(child.names(), vec!["beep", "say", "clear"]);
    }

    #[test]
    fn arguments_lookup() {
        let args = Arguments::new(vec![
            ("text".into(), ArgumentValue::Constant("hi".into())),
            ("who".into(), ArgumentValue::Variable { name: "who".into(), value: None }),
        ]);
        assert_eq!(args.text("text"), Some("hi"));
        assert_eq!(args.text("who"), None);
        assert_eq!(args.require("missing").unwrap_err().to_string(), "missing argument 'missing'");
        assert_eq!(args.len(), 2);
    }
}
