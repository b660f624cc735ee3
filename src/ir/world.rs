//! Program-element model consulted by the optimizer.
//!
//! The CPS graph refers to classes, functions, and fields by id; the
//! `ClassWorld` owns the tables behind those ids and answers the two
//! questions the optimizer asks about them: subtype relationships between
//! interface types, and the runtime class of a compile-time constant.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use super::constant::ConstantValue;

/// Interned class identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

/// Interned top-level function / method identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(u32);

/// Interned field identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldId(u32);

struct ClassDef {
    name: Arc<str>,
    /// Direct declared supertypes. Transitive closure is computed on query.
    supertypes: Vec<ClassId>,
}

/// The core classes every program links against.
#[derive(Debug, Clone, Copy)]
pub struct CoreClasses {
    pub object: ClassId,
    pub null: ClassId,
    pub bool_class: ClassId,
    pub num: ClassId,
    pub int: ClassId,
    pub double: ClassId,
    pub string: ClassId,
    pub function: ClassId,
    pub list: ClassId,
    pub map: ClassId,
    pub type_class: ClassId,
}

/// Class hierarchy plus function/field tables.
pub struct ClassWorld {
    classes: Vec<ClassDef>,
    class_by_name: FxHashMap<Arc<str>, ClassId>,
    functions: Vec<Arc<str>>,
    fields: Vec<Arc<str>>,
    core: CoreClasses,
}

impl ClassWorld {
    /// Create a world populated with the core class hierarchy.
    pub fn new() -> Self {
        let mut world = ClassWorld {
            classes: Vec::new(),
            class_by_name: FxHashMap::default(),
            functions: Vec::new(),
            fields: Vec::new(),
            // Placeholder, replaced below once the core classes exist.
            core: CoreClasses {
                object: ClassId(0),
                null: ClassId(0),
                bool_class: ClassId(0),
                num: ClassId(0),
                int: ClassId(0),
                double: ClassId(0),
                string: ClassId(0),
                function: ClassId(0),
                list: ClassId(0),
                map: ClassId(0),
                type_class: ClassId(0),
            },
        };

        let object = world.add_class("Object", &[]);
        let null = world.add_class("Null", &[object]);
        let bool_class = world.add_class("bool", &[object]);
        let num = world.add_class("num", &[object]);
        let int = world.add_class("int", &[num]);
        let double = world.add_class("double", &[num]);
        let string = world.add_class("String", &[object]);
        let function = world.add_class("Function", &[object]);
        let list = world.add_class("List", &[object]);
        let map = world.add_class("Map", &[object]);
        let type_class = world.add_class("Type", &[object]);

        world.core = CoreClasses {
            object,
            null,
            bool_class,
            num,
            int,
            double,
            string,
            function,
            list,
            map,
            type_class,
        };
        world
    }

    /// Register a class with its direct supertypes.
    pub fn add_class(&mut self, name: &str, supertypes: &[ClassId]) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.classes.push(ClassDef {
            name: name.clone(),
            supertypes: supertypes.to_vec(),
        });
        self.class_by_name.insert(name, id);
        id
    }

    /// Register a function, returning its id.
    pub fn add_function(&mut self, name: &str) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(Arc::from(name));
        id
    }

    /// Register a field, returning its id.
    pub fn add_field(&mut self, name: &str) -> FieldId {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(Arc::from(name));
        id
    }

    pub fn class_name(&self, id: ClassId) -> &str {
        &self.classes[id.0 as usize].name
    }

    pub fn class_named(&self, name: &str) -> Option<ClassId> {
        self.class_by_name.get(name).copied()
    }

    pub fn function_name(&self, id: FunctionId) -> &str {
        &self.functions[id.0 as usize]
    }

    pub fn field_name(&self, id: FieldId) -> &str {
        &self.fields[id.0 as usize]
    }

    pub fn core(&self) -> &CoreClasses {
        &self.core
    }

    /// Reflexive-transitive subtype test over declared supertypes.
    pub fn is_subtype(&self, sub: ClassId, sup: ClassId) -> bool {
        if sub == sup {
            return true;
        }
        let mut stack = vec![sub];
        let mut seen = vec![false; self.classes.len()];
        while let Some(current) = stack.pop() {
            if current == sup {
                return true;
            }
            let idx = current.0 as usize;
            if seen[idx] {
                continue;
            }
            seen[idx] = true;
            stack.extend(self.classes[idx].supertypes.iter().copied());
        }
        false
    }

    /// The runtime class of a compile-time constant.
    pub fn class_of_constant(&self, value: &ConstantValue) -> ClassId {
        match value {
            ConstantValue::Bool(_) => self.core.bool_class,
            ConstantValue::Int(_) => self.core.int,
            ConstantValue::Double(_) => self.core.double,
            ConstantValue::Null => self.core.null,
            ConstantValue::String(_) => self.core.string,
            ConstantValue::Function(_) => self.core.function,
            ConstantValue::List(_) => self.core.list,
            ConstantValue::Map(_) => self.core.map,
            ConstantValue::Constructed(class, _) => *class,
            ConstantValue::Type(_) => self.core.type_class,
            ConstantValue::Interceptor(_) | ConstantValue::Dummy => self.core.object,
        }
    }
}

impl Default for ClassWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// A method-call descriptor: name plus argument count.
///
/// The receiver is not counted, so a binary operator like `+` has
/// `argument_count == 1` and a unary operator like `unary-` has 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    pub name: Arc<str>,
    pub argument_count: usize,
}

impl Selector {
    pub fn call(name: &str, argument_count: usize) -> Self {
        Selector {
            name: Arc::from(name),
            argument_count,
        }
    }

    /// Binary operator selector (`a + b` is `+` with one argument).
    pub fn binary_operator(name: &str) -> Self {
        Self::call(name, 1)
    }

    /// Unary operator selector (`-a` is `unary-` with zero arguments).
    pub fn unary_operator(name: &str) -> Self {
        Self::call(name, 0)
    }

    /// Whether this selector names a user-definable operator.
    pub fn is_operator(&self) -> bool {
        matches!(
            &*self.name,
            "+" | "-"
                | "*"
                | "/"
                | "~/"
                | "%"
                | "<"
                | "<="
                | ">"
                | ">="
                | "=="
                | "&"
                | "|"
                | "^"
                | "<<"
                | ">>"
                | "unary-"
                | "~"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_hierarchy() {
        let world = ClassWorld::new();
        let core = *world.core();
        assert!(world.is_subtype(core.int, core.num));
        assert!(world.is_subtype(core.int, core.object));
        assert!(world.is_subtype(core.null, core.object));
        assert!(!world.is_subtype(core.int, core.double));
        assert!(!world.is_subtype(core.object, core.int));
    }

    #[test]
    fn test_subtype_is_reflexive() {
        let world = ClassWorld::new();
        let string = world.core().string;
        assert!(world.is_subtype(string, string));
    }

    #[test]
    fn test_user_class_subtyping() {
        let mut world = ClassWorld::new();
        let object = world.core().object;
        let animal = world.add_class("Animal", &[object]);
        let cat = world.add_class("Cat", &[animal]);
        assert!(world.is_subtype(cat, animal));
        assert!(world.is_subtype(cat, object));
        assert!(!world.is_subtype(animal, cat));
        assert_eq!(world.class_name(cat), "Cat");
        assert_eq!(world.class_named("Cat"), Some(cat));
        assert_eq!(world.class_named("Dog"), None);
    }

    #[test]
    fn test_class_of_constant() {
        let world = ClassWorld::new();
        assert_eq!(
            world.class_of_constant(&ConstantValue::Int(3)),
            world.core().int
        );
        assert_eq!(
            world.class_of_constant(&ConstantValue::Null),
            world.core().null
        );
        assert_eq!(
            world.class_of_constant(&ConstantValue::string("x")),
            world.core().string
        );
    }

    #[test]
    fn test_selector_operator_classification() {
        assert!(Selector::binary_operator("+").is_operator());
        assert!(Selector::binary_operator("==").is_operator());
        assert!(Selector::unary_operator("unary-").is_operator());
        assert!(!Selector::call("toString", 0).is_operator());
    }
}
