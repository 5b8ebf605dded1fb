pub mod duration;
pub mod function;
pub mod natives;
pub mod script;
pub mod variable;

pub use function::{Arguments, ArgumentValue, Call, Function, FunctionDefinition, FunctionFactory, FunctionTable, Step};
pub use script::{RunNode, Script, ScriptState};
pub use variable::{VariableDefinition, VariableTable};

/// Записи таблиц, которые знают свое имя.
pub trait Named {
    fn name(&self) -> &str;
}

/// Таблица имя -> определение сериализуется списком, отсортированным по имени.
pub(crate) mod named_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::Named;

    pub fn serialize<S, T>(map: &BTreeMap<String, T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de> + Named,
    {
        let entries = Vec::<T>::deserialize(deserializer)?;
        Ok(entries.into_iter().map(|entry| (entry.name().to_string(), entry)).collect())
    }
}
