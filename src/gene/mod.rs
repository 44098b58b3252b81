pub mod arena;
pub mod binding;
pub mod constraints;
pub mod kind;
pub mod mutation;
pub mod pattern;
pub mod printing;
pub mod randomize;
pub mod selection;
pub mod spec;
pub mod utils;

pub use arena::{GeneArena, GeneId, GeneNode};
pub use binding::{add_binding, bind_value, copy_value_from, sync_bindings_from};
pub use kind::{
    ArrayGene, BooleanGene, DateGene, DoubleGene, EnumGene, GeneKind, IntegerGene, LongGene, ObjectGene,
    OptionalGene, SqlForeignKeyGene, SqlPrimaryKeyGene, StringGene, TimeGene, TupleGene,
};
pub use mutation::{standard_mutation, MutationContext};
pub use printing::{print, raw_value, EscapeMode};
pub use randomize::randomize;
pub use selection::{boolean_selection, repair_boolean_selection};
pub use spec::{GeneSpec, SpecKind};
