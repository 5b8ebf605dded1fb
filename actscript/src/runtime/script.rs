use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::RuntimeError;
use crate::ir::ast::{Node, NodeKind};
use crate::ir::token::Token;

use super::function::{ArgumentValue, Arguments, Call, Function, FunctionTable, Implementation, Step};
use super::variable::{VariableDefinition, VariableTable};

/// Сколько пользовательских функций может быть вложено друг в друга.
pub const MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptState {
    /// Скрипт создан, но не запущен
    Pending,
    /// Ждет внешнего события
    Waiting,
    /// Успешно завершен
    Finished,
    /// Упал на каком-то узле
    Failed,
    /// Отменен хостом
    Cancelled,
}

impl ScriptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Waiting => "Waiting",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// Узел развернутого дерева. Адресуется номером в порядке обхода (pre-order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunNode {
    pub id: usize,
    pub kind: NodeKind,
    pub token: Option<Token>,
    pub next: Option<usize>,
    pub first_arg: Option<usize>,
    pub first_child: Option<usize>,
    pub parent: Option<usize>,
    /// Узел вызвал пользовательскую функцию и ее тело уже вставлено в граф.
    pub expanded: bool,
    /// Аргументы пользовательской функции; становятся областью блока при входе в него.
    bindings: VariableTable,
}

impl RunNode {
    fn new(id: usize, node: &Node, parent: Option<usize>) -> Self {
        Self {
            id,
            kind: node.kind,
            token: node.token.clone(),
            next: None,
            first_arg: None,
            first_child: None,
            parent,
            expanded: false,
            bindings: VariableTable::new(),
        }
    }

    pub fn text(&self) -> &str {
        self.token.as_ref().map(|t| t.text.as_str()).unwrap_or("")
    }
}

// Добавляет узлы в граф в порядке обхода и возвращает id первого.
fn flatten(graph: &mut Vec<RunNode>, nodes: &[Node], parent: Option<usize>) -> Option<usize> {
    let mut first = None;
    let mut last: Option<usize> = None;

    for node in nodes {
        let id = graph.len();
        graph.push(RunNode::new(id, node, parent));
        match last {
            Some(prev) => graph[prev].next = Some(id),
            None => first = Some(id),
        }
        last = Some(id);

        let first_arg = flatten(graph, &node.args, Some(id));
        let first_child = flatten(graph, &node.children, Some(id));
        graph[id].first_arg = first_arg;
        graph[id].first_child = first_child;
    }

    first
}

/// Текущий ожидающий вызов.
struct Invocation {
    node: usize,
    name: String,
    args: Arguments,
    function: Box<dyn Function>,
}

/// Среда выполнения одного скрипта.
///
/// Цикл кооперативный: управление возвращается вызывающему только когда
/// функция попросила подождать или скрипт завершился.
pub struct Script {
    nodes: Vec<Node>,
    functions: Arc<FunctionTable>,
    variables: VariableTable,
    state: ScriptState,
    graph: Vec<RunNode>,
    current: Option<usize>,
    invocation: Option<Invocation>,
    failure: Option<RuntimeError>,
}

impl Script {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            functions: Arc::new(FunctionTable::new()),
            variables: VariableTable::new(),
            state: ScriptState::Pending,
            graph: Vec::new(),
            current: None,
            invocation: None,
            failure: None,
        }
    }

    pub fn with_functions(mut self, functions: Arc<FunctionTable>) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_variables(mut self, variables: VariableTable) -> Self {
        self.variables = variables;
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn state(&self) -> ScriptState {
        self.state
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// Активная область переменных (самая вложенная).
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    /// Хост может положить сюда данные события перед `resume`.
    pub fn variables_mut(&mut self) -> &mut VariableTable {
        &mut self.variables
    }

    pub fn graph(&self) -> &[RunNode] {
        &self.graph
    }

    pub fn node(&self, id: usize) -> Option<&RunNode> {
        self.graph.get(id)
    }

    /// Узел, который выполняется или ждет.
    pub fn current_node(&self) -> Option<usize> {
        self.current
    }

    /// Имя функции, на которой скрипт остановился.
    pub fn waiting_on(&self) -> Option<&str> {
        self.invocation.as_ref().map(|inv| inv.name.as_str())
    }

    pub fn failure(&self) -> Option<&RuntimeError> {
        self.failure.as_ref()
    }

    pub fn failed_at(&self) -> Option<usize> {
        self.failure.as_ref().and_then(RuntimeError::node)
    }

    pub fn start(&mut self) -> Result<ScriptState, RuntimeError> {
        if self.state != ScriptState::Pending {
            return Err(RuntimeError::InvalidState { action: "start", state: self.state });
        }

        self.graph.clear();
        let first = flatten(&mut self.graph, &self.nodes, None);
        debug!(nodes = self.graph.len(), "script starting");

        match first {
            Some(id) => {
                self.current = Some(id);
                self.execute_loop()
            }
            None => {
                self.state = ScriptState::Finished;
                Ok(self.state)
            }
        }
    }

    pub fn resume(&mut self) -> Result<ScriptState, RuntimeError> {
        if self.state != ScriptState::Waiting {
            return Err(RuntimeError::InvalidState { action: "resume", state: self.state });
        }
        let Some(mut invocation) = self.invocation.take() else {
            return Err(RuntimeError::InvalidState { action: "resume", state: self.state });
        };

        debug!(node = invocation.node, name = %invocation.name, "resuming");
        let step = {
            let mut call = Call {
                node: invocation.node,
                name: &invocation.name,
                args: &invocation.args,
                variables: &mut self.variables,
            };
            invocation.function.resume(&mut call)
        };

        match step {
            Ok(Step::Wait) => {
                self.invocation = Some(invocation);
                Ok(self.state)
            }
            Ok(Step::Done) => {
                self.advance(invocation.node);
                self.execute_loop()
            }
            Err(source) => Err(self.fail(RuntimeError::FunctionFailed {
                node: invocation.node,
                name: invocation.name,
                source,
            })),
        }
    }

    /// Отмена: ожидающая функция получает `cancel` и освобождает свое ожидание.
    pub fn cancel(&mut self) -> Result<ScriptState, RuntimeError> {
        if self.state.is_terminal() {
            return Err(RuntimeError::InvalidState { action: "cancel", state: self.state });
        }
        if let Some(mut invocation) = self.invocation.take() {
            debug!(node = invocation.node, name = %invocation.name, "cancelling wait");
            invocation.function.cancel();
        }
        self.state = ScriptState::Cancelled;
        Ok(self.state)
    }

    fn execute_loop(&mut self) -> Result<ScriptState, RuntimeError> {
        while let Some(id) = self.current {
            match self.execute_node(id) {
                Ok(Step::Done) => self.advance(id),
                Ok(Step::Wait) => {
                    debug!(node = id, "script waiting");
                    self.state = ScriptState::Waiting;
                    return Ok(self.state);
                }
                Err(err) => return Err(self.fail(err)),
            }
        }

        debug!("script finished");
        self.state = ScriptState::Finished;
        Ok(self.state)
    }

    fn execute_node(&mut self, id: usize) -> Result<Step, RuntimeError> {
        let node = &self.graph[id];
        if node.kind != NodeKind::Function {
            return Err(RuntimeError::InvalidNode { node: id, kind: node.kind });
        }

        let name = node.text().to_string();
        trace!(node = id, name = %name, "executing");
        let functions = Arc::clone(&self.functions);
        let implementation = functions.get(&name).and_then(|def| def.implementation());
        let Some(implementation) = implementation else {
            return Err(RuntimeError::UnknownFunction { node: id, name });
        };

        let args = self.evaluate_arguments(id)?;
        match implementation {
            Implementation::Native(factory) => {
                let mut function = factory.create();
                let step = {
                    let mut call = Call { node: id, name: &name, args: &args, variables: &mut self.variables };
                    function.start(&mut call)
                };
                match step {
                    Ok(Step::Wait) => {
                        self.invocation = Some(Invocation { node: id, name, args, function });
                        Ok(Step::Wait)
                    }
                    Ok(Step::Done) => Ok(Step::Done),
                    Err(source) => Err(RuntimeError::FunctionFailed { node: id, name, source }),
                }
            }
            Implementation::Composed(body) => {
                self.expand(id, &name, body, args)?;
                Ok(Step::Done)
            }
        }
    }

    // Тело пользовательской функции вставляется перед собственным блоком
    // вызова; аргументы становятся переменными области этого блока.
    fn expand(&mut self, id: usize, name: &str, body: &Node, args: Arguments) -> Result<(), RuntimeError> {
        if self.call_depth(id) >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimit { node: id, name: name.to_string() });
        }

        let mut bindings = VariableTable::new();
        for (arg, value) in args.iter() {
            let var = VariableDefinition { name: arg.to_string(), value: value.text().map(str::to_string) };
            if bindings.insert(var).is_err() {
                return Err(RuntimeError::DuplicateArgument { node: id, name: arg.to_string() });
            }
        }

        let own_children = self.graph[id].first_child;
        if let Some(first) = flatten(&mut self.graph, &body.children, Some(id)) {
            let mut last = first;
            while let Some(next) = self.graph[last].next {
                last = next;
            }
            self.graph[last].next = own_children;
            self.graph[id].first_child = Some(first);
        }

        let node = &mut self.graph[id];
        node.expanded = true;
        node.bindings = bindings;
        debug!(node = id, name, total = self.graph.len(), "expanded function body");
        Ok(())
    }

    fn call_depth(&self, id: usize) -> usize {
        let mut depth = 0;
        let mut cursor = self.graph[id].parent;
        while let Some(parent) = cursor {
            if self.graph[parent].expanded {
                depth += 1;
            }
            cursor = self.graph[parent].parent;
        }
        depth
    }

    fn evaluate_arguments(&self, id: usize) -> Result<Arguments, RuntimeError> {
        let mut entries = Vec::new();
        let mut cursor = self.graph[id].first_arg;
        while let Some(arg_id) = cursor {
            let arg = &self.graph[arg_id];
            if let Some(value_id) = arg.first_child {
                entries.push((arg.text().to_string(), self.evaluate(value_id)?));
            }
            cursor = arg.next;
        }
        Ok(Arguments::new(entries))
    }

    fn evaluate(&self, id: usize) -> Result<ArgumentValue, RuntimeError> {
        let node = &self.graph[id];
        let name = node.text().to_string();
        match node.kind {
            NodeKind::Constant => Ok(ArgumentValue::Constant(name)),
            NodeKind::Resource => match self.variables.get(&name) {
                Some(var) => Ok(ArgumentValue::Resource { value: var.value.clone(), name }),
                None => Err(RuntimeError::UnknownResource { node: id, name }),
            },
            NodeKind::Variable => match self.variables.get(&name) {
                Some(var) => Ok(ArgumentValue::Variable { value: var.value.clone(), name }),
                None => Err(RuntimeError::UnknownVariable { node: id, name }),
            },
            NodeKind::Function | NodeKind::Argument | NodeKind::Invalid => {
                Err(RuntimeError::InvalidNode { node: id, kind: node.kind })
            }
        }
    }

    // Следующий узел в порядке обхода. Вход в блок открывает область
    // переменных, выход из блока ее закрывает.
    fn advance(&mut self, from: usize) {
        if let Some(child) = self.graph[from].first_child {
            let bindings = std::mem::take(&mut self.graph[from].bindings);
            self.enter_scope(bindings);
            self.current = Some(child);
            return;
        }

        let mut id = from;
        loop {
            if let Some(next) = self.graph[id].next {
                self.current = Some(next);
                return;
            }
            match self.graph[id].parent {
                Some(parent) => {
                    self.leave_scope();
                    id = parent;
                }
                None => {
                    self.current = None;
                    return;
                }
            }
        }
    }

    fn enter_scope(&mut self, mut scope: VariableTable) {
        scope.parent = Some(Box::new(std::mem::take(&mut self.variables)));
        self.variables = scope;
    }

    fn leave_scope(&mut self) {
        self.variables = std::mem::take(&mut self.variables).pop_scope();
    }

    fn fail(&mut self, err: RuntimeError) -> RuntimeError {
        warn!(error = %err, node = ?err.node(), "script failed");
        self.state = ScriptState::Failed;
        self.invocation = None;
        self.failure = Some(err.clone());
        err
    }
}
