use regex::Regex;

use super::kind::{
    BooleanGene, DoubleGene, EnumGene, IntegerGene, LongGene, SqlForeignKeyGene, StringGene,
};
use super::pattern::shortest_match;
use super::utils::padded;
use crate::error::{Result, SearchError};

/// Owned, arena-free description of a gene tree.
///
/// Templates (action catalogs, array elements) are kept in this form and
/// instantiated into a [`GeneArena`](super::GeneArena) when an individual is
/// built. Values are carried along, so a spec is also what a gene exports to
/// when it is copied across arenas.
#[derive(Debug, Clone)]
pub struct GeneSpec {
    pub name: String,
    pub kind: SpecKind,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub enum SpecKind {
    Integer(IntegerGene),
    Long(LongGene),
    Double(DoubleGene),
    Boolean(BooleanGene),
    String(StringGene),
    Enum(EnumGene),
    Object(Vec<GeneSpec>),
    Array {
        template: Box<GeneSpec>,
        elements: Vec<GeneSpec>,
        min_size: usize,
        max_size: usize,
    },
    Tuple {
        elements: Vec<GeneSpec>,
        last_element_treated_specially: bool,
    },
    Optional {
        gene: Box<GeneSpec>,
        is_active: bool,
        selectable: bool,
    },
    Cycle,
    Limit,
    Date {
        year: i32,
        month: i32,
        day: i32,
    },
    Time {
        hour: i32,
        minute: i32,
        second: i32,
    },
    SqlAutoIncrement,
    SqlPrimaryKey {
        gene: Box<GeneSpec>,
        table: String,
        unique_id: u64,
    },
    SqlForeignKey(SqlForeignKeyGene),
}

impl GeneSpec {
    pub fn new(name: &str, kind: SpecKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mutable: true,
        }
    }

    pub fn integer(name: &str, min: i32, max: i32) -> Self {
        let value = closest_to_zero(min as i64, max as i64) as i32;
        Self::new(name, SpecKind::Integer(IntegerGene { value, min, max }))
    }

    pub fn long(name: &str, min: i64, max: i64) -> Self {
        let value = closest_to_zero(min, max);
        Self::new(name, SpecKind::Long(LongGene { value, min, max }))
    }

    pub fn double(name: &str, min: f64, max: f64) -> Self {
        let value = if min > 0.0 {
            min
        } else if max < 0.0 {
            max
        } else {
            0.0
        };
        Self::new(
            name,
            SpecKind::Double(DoubleGene {
                value,
                min,
                max,
                is_float: false,
            }),
        )
    }

    pub fn float(name: &str, min: f64, max: f64) -> Self {
        let mut spec = Self::double(name, min, max);
        if let SpecKind::Double(d) = &mut spec.kind {
            d.is_float = true;
        }
        spec
    }

    pub fn boolean(name: &str, value: bool) -> Self {
        Self::new(name, SpecKind::Boolean(BooleanGene { value }))
    }

    pub fn string(name: &str, min_length: usize, max_length: usize) -> Self {
        let value = "x".repeat(min_length);
        Self::new(
            name,
            SpecKind::String(StringGene {
                value,
                min_length,
                max_length,
                pattern: None,
                specializations: Vec::new(),
                selected_specialization: None,
            }),
        )
    }

    pub fn string_value(name: &str, value: &str) -> Self {
        let mut spec = Self::string(name, 0, 16.max(value.len()));
        if let SpecKind::String(s) = &mut spec.kind {
            s.value = value.to_string();
        }
        spec
    }

    /// String constrained by `pattern`. Values are generated from the pattern;
    /// matching `examples` are kept as specializations. Starts at the first
    /// example, or at the shortest string the pattern accepts.
    pub fn string_with_pattern(name: &str, pattern: &str, examples: &[&str]) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| SearchError::Configuration(format!("Invalid pattern {}: {}", pattern, e)))?;
        let examples: Vec<String> = examples
            .iter()
            .filter(|e| regex.is_match(e))
            .map(|e| e.to_string())
            .collect();
        let value = match examples.first() {
            Some(e) => e.clone(),
            None => {
                let shortest = shortest_match(&regex)?;
                if regex.is_match(&shortest) {
                    shortest
                } else {
                    String::new()
                }
            }
        };

        Ok(Self::new(
            name,
            SpecKind::String(StringGene {
                value,
                min_length: 0,
                max_length: 64,
                pattern: Some(regex),
                specializations: examples,
                selected_specialization: None,
            }),
        ))
    }

    pub fn enumeration(name: &str, values: &[&str]) -> Self {
        Self::new(
            name,
            SpecKind::Enum(EnumGene {
                values: values.iter().map(|v| v.to_string()).collect(),
                index: 0,
            }),
        )
    }

    pub fn object(name: &str, fields: Vec<GeneSpec>) -> Self {
        Self::new(name, SpecKind::Object(fields))
    }

    pub fn array(name: &str, template: GeneSpec, min_size: usize, max_size: usize) -> Self {
        Self::new(
            name,
            SpecKind::Array {
                template: Box::new(template),
                elements: Vec::new(),
                min_size,
                max_size,
            },
        )
    }

    pub fn tuple(name: &str, elements: Vec<GeneSpec>, last_element_treated_specially: bool) -> Self {
        Self::new(
            name,
            SpecKind::Tuple {
                elements,
                last_element_treated_specially,
            },
        )
    }

    pub fn optional(name: &str, gene: GeneSpec) -> Self {
        Self::new(
            name,
            SpecKind::Optional {
                gene: Box::new(gene),
                is_active: true,
                selectable: true,
            },
        )
    }

    pub fn cycle(name: &str) -> Self {
        Self::new(name, SpecKind::Cycle)
    }

    pub fn limit(name: &str) -> Self {
        Self::new(name, SpecKind::Limit)
    }

    pub fn date(name: &str) -> Self {
        Self::new(
            name,
            SpecKind::Date {
                year: 2016,
                month: 3,
                day: 12,
            },
        )
    }

    pub fn time(name: &str) -> Self {
        Self::new(
            name,
            SpecKind::Time {
                hour: 12,
                minute: 0,
                second: 0,
            },
        )
    }

    pub fn sql_auto_increment(name: &str) -> Self {
        Self::new(name, SpecKind::SqlAutoIncrement)
    }

    pub fn sql_primary_key(name: &str, table: &str, unique_id: u64, gene: GeneSpec) -> Self {
        Self::new(
            name,
            SpecKind::SqlPrimaryKey {
                gene: Box::new(gene),
                table: table.to_string(),
                unique_id,
            },
        )
    }

    pub fn sql_foreign_key(name: &str, target_table: &str, nullable: bool) -> Self {
        Self::new(
            name,
            SpecKind::SqlForeignKey(SqlForeignKeyGene {
                target_table: target_table.to_string(),
                unique_id_of_primary_key: None,
                nullable,
            }),
        )
    }

    pub fn with_value_i32(mut self, value: i32) -> Self {
        if let SpecKind::Integer(g) = &mut self.kind {
            g.value = value.max(g.min).min(g.max);
        }
        self
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Pre-order walk over this spec and its nested specs
    pub fn visit<F: FnMut(&GeneSpec)>(&self, f: &mut F) {
        f(self);
        match &self.kind {
            SpecKind::Object(fields) => fields.iter().for_each(|g| g.visit(f)),
            SpecKind::Array { elements, .. } => elements.iter().for_each(|g| g.visit(f)),
            SpecKind::Tuple { elements, .. } => elements.iter().for_each(|g| g.visit(f)),
            SpecKind::Optional { gene, .. } => gene.visit(f),
            SpecKind::SqlPrimaryKey { gene, .. } => gene.visit(f),
            _ => {}
        }
    }
}

impl SpecKind {
    /// Same names as [`GeneKind::type_name`](super::GeneKind::type_name)
    pub fn type_name(&self) -> &'static str {
        match self {
            SpecKind::Integer(_) => "IntegerGene",
            SpecKind::Long(_) => "LongGene",
            SpecKind::Double(_) => "DoubleGene",
            SpecKind::Boolean(_) => "BooleanGene",
            SpecKind::String(_) => "StringGene",
            SpecKind::Enum(_) => "EnumGene",
            SpecKind::Object(_) => "ObjectGene",
            SpecKind::Array { .. } => "ArrayGene",
            SpecKind::Tuple { .. } => "TupleGene",
            SpecKind::Optional { .. } => "OptionalGene",
            SpecKind::Cycle => "CycleObjectGene",
            SpecKind::Limit => "LimitObjectGene",
            SpecKind::Date { .. } => "DateGene",
            SpecKind::Time { .. } => "TimeGene",
            SpecKind::SqlAutoIncrement => "SqlAutoIncrementGene",
            SpecKind::SqlPrimaryKey { .. } => "SqlPrimaryKeyGene",
            SpecKind::SqlForeignKey(_) => "SqlForeignKeyGene",
        }
    }

    /// Raw textual value of a scalar spec; `None` for composites
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            SpecKind::Integer(g) => Some(g.value.to_string()),
            SpecKind::Long(g) => Some(g.value.to_string()),
            SpecKind::Double(g) => Some(g.value.to_string()),
            SpecKind::Boolean(g) => Some(g.value.to_string()),
            SpecKind::String(g) => Some(g.current().to_string()),
            SpecKind::Enum(g) => Some(g.current().to_string()),
            SpecKind::Date { year, month, day } => Some(format!(
                "{}-{}-{}",
                padded(*year, 4),
                padded(*month, 2),
                padded(*day, 2)
            )),
            SpecKind::Time {
                hour,
                minute,
                second,
            } => Some(format!(
                "{}:{}:{}",
                padded(*hour, 2),
                padded(*minute, 2),
                padded(*second, 2)
            )),
            SpecKind::SqlPrimaryKey { gene, .. } => gene.kind.scalar_text(),
            SpecKind::Optional { gene, is_active, .. } if *is_active => gene.kind.scalar_text(),
            _ => None,
        }
    }
}

fn closest_to_zero(min: i64, max: i64) -> i64 {
    if min > 0 {
        min
    } else if max < 0 {
        max
    } else {
        0
    }
}
