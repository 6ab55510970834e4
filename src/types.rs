use std::fmt::{Display, Formatter};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DataType {
    Null,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal(u8, u8),
    String,
    Binary,
    Date,
    Timestamp,
    Array(Box<DataType>),
    Map(Box<DataType>, Box<DataType>),
    Struct(Fields),
}

impl DataType {
    pub fn is_numeric_type(&self) -> bool {
        matches!(
            self,
            DataType::Byte
                | DataType::Short
                | DataType::Int
                | DataType::Long
                | DataType::Float
                | DataType::Double
                | DataType::Decimal(_, _)
        )
    }

    pub fn is_integral_type(&self) -> bool {
        matches!(
            self,
            DataType::Byte | DataType::Short | DataType::Int | DataType::Long
        )
    }

    /// Position in the implicit numeric widening order. Decimal sits between
    /// the integral types and the floating ones, like the SQL type ladder.
    pub fn numeric_precedence(&self) -> Option<u8> {
        match self {
            DataType::Byte => Some(0),
            DataType::Short => Some(1),
            DataType::Int => Some(2),
            DataType::Long => Some(3),
            DataType::Decimal(_, _) => Some(4),
            DataType::Float => Some(5),
            DataType::Double => Some(6),
            _ => None,
        }
    }

    pub fn struct_fields(&self) -> Option<&Fields> {
        match self {
            DataType::Struct(fields) => Some(fields),
            _ => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Boolean => write!(f, "boolean"),
            DataType::Byte => write!(f, "byte"),
            DataType::Short => write!(f, "short"),
            DataType::Int => write!(f, "int"),
            DataType::Long => write!(f, "long"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::Decimal(p, s) => write!(f, "decimal({},{})", p, s),
            DataType::String => write!(f, "string"),
            DataType::Binary => write!(f, "binary"),
            DataType::Date => write!(f, "date"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Array(element) => write!(f, "array<{}>", element),
            DataType::Map(key, value) => write!(f, "map<{},{}>", key, value),
            DataType::Struct(fields) => {
                write!(f, "struct<")?;
                for (i, field) in fields.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Field {
        Field { name: name.into(), data_type, nullable: true }
    }

    pub fn new_not_null(name: impl Into<String>, data_type: DataType) -> Field {
        Field { name: name.into(), data_type, nullable: false }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Fields(pub Vec<Field>);

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Schema {
        Schema { fields }
    }

    pub fn to_struct_type(&self) -> DataType {
        DataType::Struct(Fields(self.fields.clone()))
    }
}

/// Whether an explicit `cast(from as to)` is well formed. Deliberately
/// permissive: lossy-but-legal casts are allowed here, the analyzer's
/// up-cast rule separately rejects the implicit lossy ones.
pub fn can_cast(from: &DataType, to: &DataType) -> bool {
    if from == to || *from == DataType::Null {
        return true;
    }
    match (from, to) {
        (_, DataType::String) => true,
        (DataType::String, t) if t.is_numeric_type() => true,
        (DataType::String, DataType::Boolean | DataType::Date | DataType::Timestamp) => true,
        (f, t) if f.is_numeric_type() && t.is_numeric_type() => true,
        (f, DataType::Boolean) if f.is_numeric_type() => true,
        (DataType::Boolean, t) if t.is_numeric_type() => true,
        (DataType::Timestamp, DataType::Long | DataType::Date) => true,
        (DataType::Long | DataType::Date, DataType::Timestamp) => true,
        (DataType::Date, DataType::Long) => true,
        (DataType::Array(f), DataType::Array(t)) => can_cast(f, t),
        (DataType::Map(fk, fv), DataType::Map(tk, tv)) => can_cast(fk, tk) && can_cast(fv, tv),
        (DataType::Struct(f), DataType::Struct(t)) => {
            f.0.len() == t.0.len()
                && f.0
                    .iter()
                    .zip(t.0.iter())
                    .all(|(ff, tf)| can_cast(&ff.data_type, &tf.data_type))
        }
        _ => false,
    }
}

/// Loose type expectations declared by functions for their arguments,
/// consulted by type checking and by the implicit-cast coercion rule.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum AbstractDataType {
    Any,
    Numeric,
    Specific(DataType),
    AnyArray,
    AnyMap,
    AnyStruct,
}

impl AbstractDataType {
    pub fn accepts_type(&self, data_type: &DataType) -> bool {
        match self {
            AbstractDataType::Any => true,
            AbstractDataType::Numeric => data_type.is_numeric_type(),
            AbstractDataType::Specific(expected) => expected == data_type,
            AbstractDataType::AnyArray => matches!(data_type, DataType::Array(_)),
            AbstractDataType::AnyMap => matches!(data_type, DataType::Map(_, _)),
            AbstractDataType::AnyStruct => matches!(data_type, DataType::Struct(_)),
        }
    }
}
