use serde::{Deserialize, Serialize};

use super::SqlInsert;
use crate::error::{Result, SearchError};
use crate::gene::GeneSpec;
use crate::search::action::{ActionKind, ActionTemplate};

const DEFAULT_TEXT_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    BigSerial,
    Real,
    Double,
    Boolean,
    Char,
    Varchar(usize),
    Clob,
    Date,
    Time,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub primary_key: bool,
    pub auto_increment: bool,
    pub nullable: bool,
    /// Referenced table, when the column is a foreign key
    pub foreign_key: Option<String>,
    /// Values allowed by `CHECK (col IN (...))` constraints, one set per constraint
    pub enum_constraints: Vec<Vec<String>>,
    /// Bounds from `CHECK (col >= x)` / `CHECK (col <= x)` constraints
    pub lower_bounds: Vec<i32>,
    pub upper_bounds: Vec<i32>,
}

impl Column {
    pub fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
            primary_key: false,
            auto_increment: matches!(column_type, ColumnType::BigSerial),
            nullable: false,
            foreign_key: None,
            enum_constraints: Vec::new(),
            lower_bounds: Vec::new(),
            upper_bounds: Vec::new(),
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn references(mut self, table: &str) -> Self {
        self.foreign_key = Some(table.to_string());
        self
    }

    pub fn check_in(mut self, values: &[&str]) -> Self {
        self.enum_constraints
            .push(values.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn check_between(mut self, lower: i32, upper: i32) -> Self {
        self.lower_bounds.push(lower);
        self.upper_bounds.push(upper);
        self
    }

    /// Gene holding the value of this column in a row of `table`
    pub fn to_gene(&self, table: &str) -> Result<GeneSpec> {
        if let Some(target) = &self.foreign_key {
            return Ok(GeneSpec::sql_foreign_key(&self.name, target, self.nullable));
        }

        let value = if !self.enum_constraints.is_empty() {
            GeneSpec::enum_from_constraints(&self.name, &self.enum_constraints)?
        } else if self.auto_increment {
            GeneSpec::sql_auto_increment(&self.name)
        } else {
            self.value_gene()?
        };

        if self.primary_key {
            return Ok(GeneSpec::sql_primary_key(&self.name, table, 0, value));
        }
        if self.nullable {
            return Ok(GeneSpec::optional(&self.name, value));
        }
        Ok(value)
    }

    fn value_gene(&self) -> Result<GeneSpec> {
        let name = self.name.as_str();
        let int_bounds = |min: i32, max: i32| -> Result<GeneSpec> {
            let mut lower = self.lower_bounds.clone();
            let mut upper = self.upper_bounds.clone();
            lower.push(min);
            upper.push(max);
            GeneSpec::integer_from_bounds(name, &lower, &upper)
        };

        Ok(match self.column_type {
            ColumnType::TinyInt => int_bounds(i8::MIN as i32, i8::MAX as i32)?,
            ColumnType::SmallInt => int_bounds(i16::MIN as i32, i16::MAX as i32)?,
            ColumnType::Integer => int_bounds(i32::MIN, i32::MAX)?,
            ColumnType::BigInt => GeneSpec::long(name, i64::MIN, i64::MAX),
            ColumnType::BigSerial => GeneSpec::sql_auto_increment(name),
            ColumnType::Real => GeneSpec::float(name, f32::MIN as f64, f32::MAX as f64),
            ColumnType::Double => GeneSpec::double(name, f64::MIN, f64::MAX),
            ColumnType::Boolean => GeneSpec::boolean(name, false),
            ColumnType::Char | ColumnType::Clob => GeneSpec::string(name, 0, DEFAULT_TEXT_LENGTH),
            ColumnType::Varchar(n) => GeneSpec::string(name, 0, n),
            ColumnType::Date => GeneSpec::date(name),
            ColumnType::Time => GeneSpec::time(name),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: &str, columns: Vec<Column>) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }

    /// Template inserting one row with every column set
    pub fn insert_template(&self) -> Result<ActionTemplate> {
        if self.columns.is_empty() {
            return Err(SearchError::InvalidTemplate(format!(
                "table {} has no columns",
                self.name
            )));
        }
        let genes = self
            .columns
            .iter()
            .map(|c| c.to_gene(&self.name))
            .collect::<Result<Vec<_>>>()?;
        let columns = self.columns.iter().map(|c| c.name.clone()).collect();

        Ok(ActionTemplate::new(
            &format!("INSERT:{}", self.name),
            ActionKind::Sql(SqlInsert::new(&self.name, columns)),
            genes,
        ))
    }
}
