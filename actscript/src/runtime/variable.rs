use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TableError;

use super::{Named, named_list};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl VariableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), value: None }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn set(&mut self, value: impl Into<String>) {
        self.value = Some(value.into());
    }
}

impl Named for VariableDefinition {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Область видимости переменных. Вложенный блок получает дочернюю таблицу,
/// родитель хранится внутри нее и возвращается при выходе из блока.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariableTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<VariableTable>>,
    #[serde(with = "named_list")]
    pub variables: BTreeMap<String, VariableDefinition>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(variables: impl IntoIterator<Item = VariableDefinition>) -> Self {
        let variables = variables.into_iter().map(|var| (var.name.clone(), var)).collect();
        Self { parent: None, variables }
    }

    /// Открывает вложенную область поверх текущей.
    pub fn push_scope(self) -> Self {
        Self { parent: Some(Box::new(self)), variables: BTreeMap::new() }
    }

    /// Закрывает текущую область; у корня возвращает саму таблицу.
    pub fn pop_scope(mut self) -> Self {
        match self.parent.take() {
            Some(parent) => *parent,
            None => self,
        }
    }

    pub fn depth(&self) -> usize {
        self.parent.as_ref().map_or(0, |parent| parent.depth() + 1)
    }

    pub fn get(&self, name: &str) -> Option<&VariableDefinition> {
        match self.variables.get(name) {
            Some(var) => Some(var),
            None => self.parent.as_ref().and_then(|parent| parent.get(name)),
        }
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut VariableDefinition> {
        match self.variables.get_mut(name) {
            Some(var) => Some(var),
            None => self.parent.as_mut().and_then(|parent| parent.get_mut(name)),
        }
    }

    /// Объявляет переменную в текущей области. Имя родителя можно перекрыть,
    /// повторное объявление в той же области - ошибка.
    pub fn add(&mut self, name: &str) -> Result<&mut VariableDefinition, TableError> {
        self.insert(VariableDefinition::new(name))
    }

    pub fn insert(&mut self, var: VariableDefinition) -> Result<&mut VariableDefinition, TableError> {
        if self.variables.contains_key(&var.name) {
            return Err(TableError::DuplicateVariable(var.name));
        }
        Ok(self.variables.entry(var.name.clone()).or_insert(var))
    }

    /// Присваивает ближайшей видимой переменной. `false`, если имени нет ни в одной области.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.get_mut(name) {
            Some(var) => {
                var.set(value);
                true
            }
            None => false,
        }
    }

    /// Локальные определения, по имени.
    pub fn definitions(&self) -> impl Iterator<Item = &VariableDefinition> {
        self.variables.values()
    }
}
