use regex::Regex;

use super::arena::GeneId;
use super::spec::GeneSpec;

#[derive(Debug, Clone, PartialEq)]
pub struct IntegerGene {
    pub value: i32,
    pub min: i32,
    pub max: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongGene {
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

/// Floating point value; `is_float` only changes how it is printed
#[derive(Debug, Clone, PartialEq)]
pub struct DoubleGene {
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub is_float: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BooleanGene {
    pub value: bool,
}

/// Free text with length bounds and an optional pattern.
///
/// Specializations are alternative literal values (e.g. received through a
/// binding with a gene of another type). When one is selected it replaces
/// `value` in the phenotype.
#[derive(Debug, Clone)]
pub struct StringGene {
    pub value: String,
    pub min_length: usize,
    pub max_length: usize,
    pub pattern: Option<Regex>,
    pub specializations: Vec<String>,
    pub selected_specialization: Option<usize>,
}

impl StringGene {
    pub fn current(&self) -> &str {
        match self.selected_specialization.and_then(|i| self.specializations.get(i)) {
            Some(s) => s,
            None => &self.value,
        }
    }

    pub fn matches_pattern(&self, s: &str) -> bool {
        match &self.pattern {
            Some(p) => p.is_match(s),
            None => true,
        }
    }

    /// Store `value` as a specialization (once) and select it
    pub fn add_and_select_specialization(&mut self, value: String) {
        let index = match self.specializations.iter().position(|s| *s == value) {
            Some(i) => i,
            None => {
                self.specializations.push(value);
                self.specializations.len() - 1
            }
        };
        self.selected_specialization = Some(index);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumGene {
    pub values: Vec<String>,
    pub index: usize,
}

impl EnumGene {
    pub fn current(&self) -> &str {
        self.values.get(self.index).map(|s| s.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectGene {
    pub fields: Vec<GeneId>,
}

/// Homogeneous list; new elements are instantiated from `template`
#[derive(Debug, Clone)]
pub struct ArrayGene {
    pub template: Box<GeneSpec>,
    pub elements: Vec<GeneId>,
    pub min_size: usize,
    pub max_size: usize,
}

impl ArrayGene {
    pub fn force_to_only_empty(&mut self) {
        self.min_size = 0;
        self.max_size = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleGene {
    pub elements: Vec<GeneId>,
    pub last_element_treated_specially: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionalGene {
    pub gene: GeneId,
    pub is_active: bool,
    pub selectable: bool,
}

impl OptionalGene {
    pub fn forbid_selection(&mut self) {
        self.selectable = false;
        self.is_active = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateGene {
    pub year: GeneId,
    pub month: GeneId,
    pub day: GeneId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeGene {
    pub hour: GeneId,
    pub minute: GeneId,
    pub second: GeneId,
}

/// Column value wrapped with the identity of the row it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct SqlPrimaryKeyGene {
    pub gene: GeneId,
    pub table: String,
    pub unique_id: u64,
}

/// Reference to the primary key of a row inserted earlier
#[derive(Debug, Clone, PartialEq)]
pub struct SqlForeignKeyGene {
    pub target_table: String,
    pub unique_id_of_primary_key: Option<u64>,
    pub nullable: bool,
}

#[derive(Debug, Clone)]
pub enum GeneKind {
    Integer(IntegerGene),
    Long(LongGene),
    Double(DoubleGene),
    Boolean(BooleanGene),
    String(StringGene),
    Enum(EnumGene),
    Object(ObjectGene),
    Array(ArrayGene),
    Tuple(TupleGene),
    Optional(OptionalGene),
    /// Marks where a self-referential schema type was cut
    Cycle,
    /// Marks where the depth limit of a schema unrolling was reached
    Limit,
    Date(DateGene),
    Time(TimeGene),
    SqlAutoIncrement,
    SqlPrimaryKey(SqlPrimaryKeyGene),
    SqlForeignKey(SqlForeignKeyGene),
}

impl GeneKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            GeneKind::Integer(_) => "IntegerGene",
            GeneKind::Long(_) => "LongGene",
            GeneKind::Double(_) => "DoubleGene",
            GeneKind::Boolean(_) => "BooleanGene",
            GeneKind::String(_) => "StringGene",
            GeneKind::Enum(_) => "EnumGene",
            GeneKind::Object(_) => "ObjectGene",
            GeneKind::Array(_) => "ArrayGene",
            GeneKind::Tuple(_) => "TupleGene",
            GeneKind::Optional(_) => "OptionalGene",
            GeneKind::Cycle => "CycleObjectGene",
            GeneKind::Limit => "LimitObjectGene",
            GeneKind::Date(_) => "DateGene",
            GeneKind::Time(_) => "TimeGene",
            GeneKind::SqlAutoIncrement => "SqlAutoIncrementGene",
            GeneKind::SqlPrimaryKey(_) => "SqlPrimaryKeyGene",
            GeneKind::SqlForeignKey(_) => "SqlForeignKeyGene",
        }
    }

    /// Direct children, in order
    pub fn children(&self) -> Vec<GeneId> {
        match self {
            GeneKind::Object(o) => o.fields.clone(),
            GeneKind::Array(a) => a.elements.clone(),
            GeneKind::Tuple(t) => t.elements.clone(),
            GeneKind::Optional(o) => vec![o.gene],
            GeneKind::Date(d) => vec![d.year, d.month, d.day],
            GeneKind::Time(t) => vec![t.hour, t.minute, t.second],
            GeneKind::SqlPrimaryKey(pk) => vec![pk.gene],
            _ => Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, GeneKind::Cycle | GeneKind::Limit)
    }
}
