use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use super::expr::{BinaryOp, Direction};
use super::ty::{Primitive, Type, TypeId};
use super::value::{ObjectRef, Value};

/// Failure raised by a host-provided member body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        HostError(message.into())
    }
}

pub type MethodFn = Arc<dyn Fn(&Value, &mut [Value]) -> Result<Value, HostError> + Send + Sync>;
pub type GetterFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, HostError> + Send + Sync>;
pub type SetterFn = Arc<dyn Fn(&Value, &[Value], Value) -> Result<(), HostError> + Send + Sync>;
pub type ConstructorFn = Arc<dyn Fn(&ObjectRef, &[Value]) -> Result<(), HostError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    /// Visible to expressions whose subject lives in the same module.
    Internal,
    /// Visible only when the declaring type is the subject type.
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class { base: Option<TypeId>, sealed: bool },
    Struct,
    Interface,
    Enum { underlying: Primitive },
}

/// Dependency annotation on a method or property, used instead of the default
/// read/write analysis of that member.
///
/// Paths are relative to the member's target, `/`-separated, and may end in `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberEffect {
    Reads(String),
    Writes(String),
    /// Apply the effects of another method of the same type.
    Invokes(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDef {
    pub name: String,
    pub ty: Type,
    pub direction: Direction,
    /// Trailing variadic array parameter.
    pub is_params: bool,
}

impl ParameterDef {
    #[must_use]
    pub fn new(name: &str, ty: Type) -> Self {
        ParameterDef {
            name: name.to_owned(),
            ty,
            direction: Direction::In,
            is_params: false,
        }
    }

    #[must_use]
    pub fn out(name: &str, ty: Type) -> Self {
        ParameterDef {
            direction: Direction::Out,
            ..ParameterDef::new(name, ty)
        }
    }

    #[must_use]
    pub fn by_ref(name: &str, ty: Type) -> Self {
        ParameterDef {
            direction: Direction::Ref,
            ..ParameterDef::new(name, ty)
        }
    }

    /// `params element[] name`.
    #[must_use]
    pub fn params(name: &str, element: Type) -> Self {
        ParameterDef {
            is_params: true,
            ..ParameterDef::new(name, Type::array(element))
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) ty: Type,
    pub(crate) declaring: TypeId,
    pub(crate) is_static: bool,
    pub(crate) visibility: Visibility,
    pub(crate) constant: Option<Value>,
    pub(crate) read_only: bool,
    initial: Option<Value>,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: &str, ty: Type) -> Self {
        FieldDef {
            name: name.to_owned(),
            ty,
            declaring: TypeId(0),
            is_static: false,
            visibility: Visibility::Public,
            constant: None,
            read_only: false,
            initial: None,
        }
    }

    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Make this a static field holding `initial`.
    #[must_use]
    pub fn make_static(mut self, initial: impl Into<Value>) -> Self {
        self.is_static = true;
        self.initial = Some(initial.into());
        self
    }

    /// A compile-time constant; implies static and read-only.
    #[must_use]
    pub fn constant(mut self, value: impl Into<Value>) -> Self {
        self.is_static = true;
        self.read_only = true;
        self.constant = Some(value.into());
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    #[must_use]
    pub fn declaring(&self) -> TypeId {
        self.declaring
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[must_use]
    pub fn get_visibility(&self) -> Visibility {
        self.visibility
    }
}

#[derive(Clone)]
pub struct PropertyDef {
    pub(crate) name: String,
    pub(crate) ty: Type,
    pub(crate) declaring: TypeId,
    pub(crate) is_static: bool,
    pub(crate) get_visibility: Visibility,
    pub(crate) set_visibility: Visibility,
    pub(crate) index_params: Vec<ParameterDef>,
    pub(crate) effects: Vec<MemberEffect>,
    getter: Option<GetterFn>,
    setter: Option<SetterFn>,
    storage: bool,
}

impl PropertyDef {
    /// A property with neither accessor; add them with [`getter`](Self::getter) and
    /// [`setter`](Self::setter).
    #[must_use]
    pub fn new(name: &str, ty: Type) -> Self {
        PropertyDef {
            name: name.to_owned(),
            ty,
            declaring: TypeId(0),
            is_static: false,
            get_visibility: Visibility::Public,
            set_visibility: Visibility::Public,
            index_params: Vec::new(),
            effects: Vec::new(),
            getter: None,
            setter: None,
            storage: false,
        }
    }

    /// A read/write property stored in the instance under its own name.
    #[must_use]
    pub fn auto(name: &str, ty: Type) -> Self {
        let key = name.to_owned();
        let set_key = name.to_owned();
        let mut def = PropertyDef::new(name, ty)
            .getter(move |this, _| {
                Ok(this
                    .as_object()
                    .and_then(|o| o.get(&key))
                    .unwrap_or(Value::Null))
            })
            .setter(move |this, _, value| match this.as_object() {
                Some(o) => {
                    o.set(&set_key, value);
                    Ok(())
                }
                None => Err(HostError::new("property target is not an object")),
            });
        def.storage = true;
        def
    }

    /// An indexer, `this[params]`.
    #[must_use]
    pub fn indexer(ty: Type, params: Vec<ParameterDef>) -> Self {
        let mut def = PropertyDef::new("Item", ty);
        def.index_params = params;
        def
    }

    #[must_use]
    pub fn getter(
        mut self,
        f: impl Fn(&Value, &[Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        self.getter = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn setter(
        mut self,
        f: impl Fn(&Value, &[Value], Value) -> Result<(), HostError> + Send + Sync + 'static,
    ) -> Self {
        self.setter = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.get_visibility = visibility;
        self.set_visibility = visibility;
        self
    }

    #[must_use]
    pub fn setter_visibility(mut self, visibility: Visibility) -> Self {
        self.set_visibility = visibility;
        self
    }

    #[must_use]
    pub fn make_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    #[must_use]
    pub fn reads(mut self, path: &str) -> Self {
        self.effects.push(MemberEffect::Reads(path.to_owned()));
        self
    }

    #[must_use]
    pub fn writes(mut self, path: &str) -> Self {
        self.effects.push(MemberEffect::Writes(path.to_owned()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    #[must_use]
    pub fn declaring(&self) -> TypeId {
        self.declaring
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[must_use]
    pub fn can_read(&self) -> bool {
        self.getter.is_some()
    }

    #[must_use]
    pub fn can_write(&self) -> bool {
        self.setter.is_some()
    }

    #[must_use]
    pub fn index_params(&self) -> &[ParameterDef] {
        &self.index_params
    }

    #[must_use]
    pub fn effects(&self) -> &[MemberEffect] {
        &self.effects
    }

    /// # Errors
    ///
    /// Returns the getter's error, or a [`HostError`] when there is no getter.
    pub fn get(&self, target: &Value, index: &[Value]) -> Result<Value, HostError> {
        match &self.getter {
            Some(f) => f(target, index),
            None => Err(HostError::new(format!("property '{}' has no getter", self.name))),
        }
    }

    /// # Errors
    ///
    /// Returns the setter's error, or a [`HostError`] when there is no setter.
    pub fn set(&self, target: &Value, index: &[Value], value: Value) -> Result<(), HostError> {
        match &self.setter {
            Some(f) => f(target, index, value),
            None => Err(HostError::new(format!("property '{}' has no setter", self.name))),
        }
    }
}

impl fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("declaring", &self.declaring)
            .field("is_static", &self.is_static)
            .field("index_params", &self.index_params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Ordinary,
    ImplicitConversion,
    ExplicitConversion,
    Operator(BinaryOp),
}

#[derive(Clone)]
pub struct MethodDef {
    pub(crate) name: String,
    pub(crate) declaring: Option<TypeId>,
    pub(crate) declaring_name: String,
    pub(crate) params: Vec<ParameterDef>,
    pub(crate) return_type: Type,
    pub(crate) is_static: bool,
    pub(crate) visibility: Visibility,
    pub(crate) kind: MethodKind,
    pub(crate) receiver: Option<Type>,
    pub(crate) effects: Vec<MemberEffect>,
    body: MethodFn,
}

impl MethodDef {
    /// A public instance method. The body receives the target and the argument
    /// values; `out` and `ref` arguments are written back from the slice.
    #[must_use]
    pub fn new(
        name: &str,
        return_type: Type,
        body: impl Fn(&Value, &mut [Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        MethodDef {
            name: name.to_owned(),
            declaring: None,
            declaring_name: String::new(),
            params: Vec::new(),
            return_type,
            is_static: false,
            visibility: Visibility::Public,
            kind: MethodKind::Ordinary,
            receiver: None,
            effects: Vec::new(),
            body: Arc::new(body),
        }
    }

    /// An extension method declared by the static class `declaring_class` (a full
    /// name, whose namespace decides proximity) that extends `receiver`.
    #[must_use]
    pub fn extension(
        declaring_class: &str,
        name: &str,
        receiver: Type,
        return_type: Type,
        body: impl Fn(&Value, &mut [Value]) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        let mut def = MethodDef::new(name, return_type, body);
        def.declaring_name = declaring_class.to_owned();
        def.receiver = Some(receiver);
        def
    }

    /// A user-defined implicit conversion operator `from -> to`.
    #[must_use]
    pub fn implicit_conversion(
        from: Type,
        to: Type,
        f: impl Fn(Value) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        Self::conversion("op_Implicit", MethodKind::ImplicitConversion, from, to, f)
    }

    /// A user-defined explicit conversion operator `from -> to`.
    #[must_use]
    pub fn explicit_conversion(
        from: Type,
        to: Type,
        f: impl Fn(Value) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        Self::conversion("op_Explicit", MethodKind::ExplicitConversion, from, to, f)
    }

    fn conversion(
        name: &str,
        kind: MethodKind,
        from: Type,
        to: Type,
        f: impl Fn(Value) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        let mut def = MethodDef::new(name, to, move |_, args| {
            f(args.first().cloned().unwrap_or(Value::Null))
        });
        def.params = vec![ParameterDef::new("value", from)];
        def.is_static = true;
        def.kind = kind;
        def
    }

    /// A user-defined binary operator overload.
    #[must_use]
    pub fn operator(
        op: BinaryOp,
        left: Type,
        right: Type,
        return_type: Type,
        f: impl Fn(Value, Value) -> Result<Value, HostError> + Send + Sync + 'static,
    ) -> Self {
        let mut def = MethodDef::new(operator_method_name(op), return_type, move |_, args| {
            let mut it = args.iter().cloned();
            let l = it.next().unwrap_or(Value::Null);
            let r = it.next().unwrap_or(Value::Null);
            f(l, r)
        });
        def.params = vec![ParameterDef::new("left", left), ParameterDef::new("right", right)];
        def.is_static = true;
        def.kind = MethodKind::Operator(op);
        def
    }

    #[must_use]
    pub fn param(mut self, param: ParameterDef) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn make_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn reads(mut self, path: &str) -> Self {
        self.effects.push(MemberEffect::Reads(path.to_owned()));
        self
    }

    #[must_use]
    pub fn writes(mut self, path: &str) -> Self {
        self.effects.push(MemberEffect::Writes(path.to_owned()));
        self
    }

    #[must_use]
    pub fn invokes(mut self, method: &str) -> Self {
        self.effects.push(MemberEffect::Invokes(method.to_owned()));
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn declaring(&self) -> Option<TypeId> {
        self.declaring
    }

    /// Full name of the declaring type (or declaring static class for extensions).
    #[must_use]
    pub fn declaring_name(&self) -> &str {
        &self.declaring_name
    }

    #[must_use]
    pub fn params(&self) -> &[ParameterDef] {
        &self.params
    }

    #[must_use]
    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    #[must_use]
    pub fn get_visibility(&self) -> Visibility {
        self.visibility
    }

    #[must_use]
    pub fn kind(&self) -> MethodKind {
        self.kind
    }

    /// The extended type of an extension method.
    #[must_use]
    pub fn receiver(&self) -> Option<&Type> {
        self.receiver.as_ref()
    }

    #[must_use]
    pub fn is_extension(&self) -> bool {
        self.receiver.is_some()
    }

    #[must_use]
    pub fn effects(&self) -> &[MemberEffect] {
        &self.effects
    }

    /// # Errors
    ///
    /// Propagates the body's error.
    pub fn invoke(&self, target: &Value, args: &mut [Value]) -> Result<Value, HostError> {
        (self.body)(target, args)
    }
}

impl fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodDef")
            .field("name", &self.name)
            .field("declaring_name", &self.declaring_name)
            .field("params", &self.params)
            .field("return_type", &self.return_type)
            .field("is_static", &self.is_static)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

pub(crate) fn operator_method_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "op_Addition",
        BinaryOp::Subtract => "op_Subtraction",
        BinaryOp::Multiply => "op_Multiply",
        BinaryOp::Divide => "op_Division",
        BinaryOp::Modulus => "op_Modulus",
        BinaryOp::IdentityEquality | BinaryOp::ValueEquality => "op_Equality",
        BinaryOp::IdentityInequality => "op_Inequality",
        BinaryOp::BitwiseOr => "op_BitwiseOr",
        BinaryOp::BitwiseAnd => "op_BitwiseAnd",
        BinaryOp::BooleanOr => "op_LogicalOr",
        BinaryOp::BooleanAnd => "op_LogicalAnd",
        BinaryOp::LessThan => "op_LessThan",
        BinaryOp::LessThanOrEqual => "op_LessThanOrEqual",
        BinaryOp::GreaterThan => "op_GreaterThan",
        BinaryOp::GreaterThanOrEqual => "op_GreaterThanOrEqual",
    }
}

#[derive(Clone)]
pub struct ConstructorDef {
    pub(crate) declaring: TypeId,
    pub(crate) params: Vec<ParameterDef>,
    pub(crate) visibility: Visibility,
    body: ConstructorFn,
}

impl ConstructorDef {
    /// The body initializes an already allocated instance whose fields hold their
    /// defaults.
    #[must_use]
    pub fn new(
        body: impl Fn(&ObjectRef, &[Value]) -> Result<(), HostError> + Send + Sync + 'static,
    ) -> Self {
        ConstructorDef {
            declaring: TypeId(0),
            params: Vec::new(),
            visibility: Visibility::Public,
            body: Arc::new(body),
        }
    }

    #[must_use]
    pub fn param(mut self, param: ParameterDef) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn declaring(&self) -> TypeId {
        self.declaring
    }

    #[must_use]
    pub fn params(&self) -> &[ParameterDef] {
        &self.params
    }

    /// # Errors
    ///
    /// Propagates the body's error.
    pub fn invoke(&self, instance: &ObjectRef, args: &[Value]) -> Result<(), HostError> {
        (self.body)(instance, args)
    }
}

impl fmt::Debug for ConstructorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstructorDef")
            .field("declaring", &self.declaring)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct TypeDef {
    id: TypeId,
    name: String,
    module: String,
    kind: TypeKind,
    interfaces: Vec<TypeId>,
    fields: Vec<Arc<FieldDef>>,
    properties: Vec<Arc<PropertyDef>>,
    methods: Vec<Arc<MethodDef>>,
    constructors: Vec<Arc<ConstructorDef>>,
    statics: RwLock<HashMap<String, Value>>,
}

impl TypeDef {
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully-qualified name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    #[must_use]
    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    #[must_use]
    pub fn interfaces(&self) -> &[TypeId] {
        &self.interfaces
    }

    #[must_use]
    pub fn fields(&self) -> &[Arc<FieldDef>] {
        &self.fields
    }

    #[must_use]
    pub fn properties(&self) -> &[Arc<PropertyDef>] {
        &self.properties
    }

    #[must_use]
    pub fn methods(&self) -> &[Arc<MethodDef>] {
        &self.methods
    }

    #[must_use]
    pub fn constructors(&self) -> &[Arc<ConstructorDef>] {
        &self.constructors
    }
}

/// Pluggable type lookup consulted while resolving type names.
///
/// [`TypeCatalog`] implements it and is used when no other provider is supplied.
pub trait TypeProvider: Send + Sync {
    fn get_type(&self, name: &str) -> Option<Type>;

    fn types(&self) -> Vec<Type>;

    fn local_module(&self) -> Option<&str>;

    fn referenced_modules(&self) -> Vec<String>;
}

/// Registry of host types and their members.
///
/// # Example
///
/// ```
/// use rulechain::{FieldDef, Type, TypeCatalog};
///
/// let mut catalog = TypeCatalog::new();
/// let counter = catalog
///     .class("Demo.Counter")
///     .field(FieldDef::new("Count", Type::INT32))
///     .id();
/// assert_eq!(catalog.find("Demo.Counter"), Some(counter));
/// ```
#[derive(Debug, Default)]
pub struct TypeCatalog {
    types: Vec<TypeDef>,
    by_name: HashMap<String, TypeId>,
    extensions: Vec<Arc<MethodDef>>,
    local_module: String,
}

impl TypeCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog whose newly declared types belong to `module`.
    #[must_use]
    pub fn with_module(module: &str) -> Self {
        TypeCatalog {
            local_module: module.to_owned(),
            ..Self::default()
        }
    }

    /// Register a type in the local module.
    pub fn declare(&mut self, name: &str, kind: TypeKind) -> TypeId {
        let module = self.local_module.clone();
        self.declare_in(&module, name, kind)
    }

    /// Register a type in another module.
    pub fn declare_in(&mut self, module: &str, name: &str, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(TypeDef {
            id,
            name: name.to_owned(),
            module: module.to_owned(),
            kind,
            interfaces: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
            constructors: Vec::new(),
            statics: RwLock::new(HashMap::new()),
        });
        self.by_name.insert(name.to_owned(), id);
        id
    }

    pub fn class(&mut self, name: &str) -> TypeBuilder<'_> {
        let id = self.declare(
            name,
            TypeKind::Class {
                base: None,
                sealed: false,
            },
        );
        self.define(id)
    }

    pub fn structure(&mut self, name: &str) -> TypeBuilder<'_> {
        let id = self.declare(name, TypeKind::Struct);
        self.define(id)
    }

    pub fn interface(&mut self, name: &str) -> TypeBuilder<'_> {
        let id = self.declare(name, TypeKind::Interface);
        self.define(id)
    }

    pub fn enumeration(&mut self, name: &str, underlying: Primitive) -> TypeBuilder<'_> {
        let id = self.declare(name, TypeKind::Enum { underlying });
        self.define(id)
    }

    /// Continue defining a previously declared type.
    pub fn define(&mut self, id: TypeId) -> TypeBuilder<'_> {
        TypeBuilder { catalog: self, id }
    }

    /// Register an extension method built with [`MethodDef::extension`].
    pub fn register_extension(&mut self, method: MethodDef) {
        self.extensions.push(Arc::new(method));
    }

    #[must_use]
    pub fn get(&self, id: TypeId) -> Option<&TypeDef> {
        self.types.get(id.0)
    }

    /// # Panics
    ///
    /// Panics if `id` was not issued by this catalog.
    #[must_use]
    pub fn def(&self, id: TypeId) -> &TypeDef {
        &self.types[id.0]
    }

    /// Look up by full name, or by short name when it is unambiguous.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<TypeId> {
        if let Some(id) = self.by_name.get(name) {
            return Some(*id);
        }
        let mut matches = self
            .types
            .iter()
            .filter(|t| t.name.rsplit('.').next() == Some(name));
        match (matches.next(), matches.next()) {
            (Some(t), None) => Some(t.id),
            _ => None,
        }
    }

    #[must_use]
    pub fn module(&self) -> &str {
        &self.local_module
    }

    /// Module of a type; primitives, arrays and nullables belong to no module.
    #[must_use]
    pub fn module_of(&self, ty: &Type) -> Option<&str> {
        ty.named().and_then(|id| self.get(id)).map(TypeDef::module)
    }

    /// Source-like display name.
    #[must_use]
    pub fn type_name(&self, ty: &Type) -> String {
        match ty {
            Type::Primitive(p) => p.keyword().to_owned(),
            Type::Null => "null".to_owned(),
            Type::Nullable(inner) => format!("{}?", self.type_name(inner)),
            Type::Array { element, rank } => {
                format!("{}[{}]", self.type_name(element), ",".repeat(rank.saturating_sub(1)))
            }
            Type::Named(id) => self
                .get(*id)
                .map_or_else(|| format!("#{}", id.0), |t| t.name.clone()),
        }
    }

    fn kind_of(&self, ty: &Type) -> Option<TypeKind> {
        ty.named().and_then(|id| self.get(id)).map(TypeDef::kind)
    }

    #[must_use]
    pub fn is_value_type(&self, ty: &Type) -> bool {
        match ty {
            Type::Primitive(p) => p.is_value_type(),
            Type::Nullable(_) => true,
            Type::Named(_) => matches!(
                self.kind_of(ty),
                Some(TypeKind::Struct | TypeKind::Enum { .. })
            ),
            Type::Null | Type::Array { .. } => false,
        }
    }

    #[must_use]
    pub fn is_non_nullable_value_type(&self, ty: &Type) -> bool {
        !ty.is_nullable() && self.is_value_type(ty)
    }

    #[must_use]
    pub fn is_interface(&self, ty: &Type) -> bool {
        matches!(self.kind_of(ty), Some(TypeKind::Interface))
    }

    #[must_use]
    pub fn is_class(&self, ty: &Type) -> bool {
        matches!(self.kind_of(ty), Some(TypeKind::Class { .. }))
    }

    #[must_use]
    pub fn is_struct(&self, ty: &Type) -> bool {
        matches!(self.kind_of(ty), Some(TypeKind::Struct))
    }

    #[must_use]
    pub fn is_sealed(&self, ty: &Type) -> bool {
        match ty {
            Type::Primitive(p) => *p != Primitive::Object,
            Type::Named(_) => match self.kind_of(ty) {
                Some(TypeKind::Class { sealed, .. }) => sealed,
                Some(TypeKind::Interface) => false,
                _ => true,
            },
            _ => true,
        }
    }

    /// Underlying integral type of an enum.
    #[must_use]
    pub fn enum_underlying(&self, ty: &Type) -> Option<Primitive> {
        match self.kind_of(ty) {
            Some(TypeKind::Enum { underlying }) => Some(underlying),
            _ => None,
        }
    }

    #[must_use]
    pub fn base_type(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id)?.kind {
            TypeKind::Class { base, .. } => base,
            _ => None,
        }
    }

    /// `id` followed by its base classes, most derived first.
    #[must_use]
    pub fn class_chain(&self, id: TypeId) -> Vec<TypeId> {
        let mut chain = vec![id];
        let mut current = id;
        while let Some(base) = self.base_type(current) {
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            current = base;
        }
        chain
    }

    /// Every interface implemented by `id`, its base classes and base interfaces.
    #[must_use]
    pub fn all_interfaces(&self, id: TypeId) -> Vec<TypeId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut pending: Vec<TypeId> = self
            .class_chain(id)
            .into_iter()
            .filter_map(|t| self.get(t))
            .flat_map(|t| t.interfaces.iter().copied())
            .collect();
        while let Some(next) = pending.pop() {
            if seen.insert(next) {
                out.push(next);
                if let Some(def) = self.get(next) {
                    pending.extend(def.interfaces.iter().copied());
                }
            }
        }
        out
    }

    /// Whether a value of type `from` is-a `to`: identity, inheritance, interface
    /// implementation, `object`, or array covariance.
    #[must_use]
    pub fn is_assignable(&self, to: &Type, from: &Type) -> bool {
        if to == from {
            return true;
        }
        match (to, from) {
            (_, Type::Null) | (_, Type::Primitive(Primitive::Void)) => false,
            (Type::Primitive(Primitive::Object), _) => true,
            (Type::Named(t), Type::Named(f)) => {
                self.class_chain(*f).contains(t) || self.all_interfaces(*f).contains(t)
            }
            (
                Type::Array {
                    element: te,
                    rank: tr,
                },
                Type::Array {
                    element: fe,
                    rank: fr,
                },
            ) => tr == fr && !self.is_value_type(fe) && self.is_assignable(te, fe),
            _ => false,
        }
    }

    /// Instance fields of `id` and its bases, most derived first.
    fn instance_fields(&self, id: TypeId) -> impl Iterator<Item = &Arc<FieldDef>> {
        self.class_chain(id)
            .into_iter()
            .filter_map(|t| self.get(t))
            .flat_map(|t| t.fields.iter())
            .filter(|f| !f.is_static)
    }

    #[must_use]
    pub fn find_field(&self, id: TypeId, name: &str) -> Option<Arc<FieldDef>> {
        self.class_chain(id)
            .into_iter()
            .filter_map(|t| self.get(t))
            .flat_map(|t| t.fields.iter())
            .find(|f| f.name == name)
            .cloned()
    }

    /// A non-indexed property on `id`, its base classes or (for interfaces) its base
    /// interfaces.
    #[must_use]
    pub fn find_property(&self, id: TypeId, name: &str) -> Option<Arc<PropertyDef>> {
        self.member_scope(id)
            .into_iter()
            .filter_map(|t| self.get(t))
            .flat_map(|t| t.properties.iter())
            .find(|p| p.name == name && p.index_params.is_empty())
            .cloned()
    }

    #[must_use]
    pub fn indexers(&self, id: TypeId) -> Vec<Arc<PropertyDef>> {
        self.member_scope(id)
            .into_iter()
            .filter_map(|t| self.get(t))
            .flat_map(|t| t.properties.iter())
            .filter(|p| !p.index_params.is_empty())
            .cloned()
            .collect()
    }

    /// Ordinary methods named `name` on `id` and its base classes.
    #[must_use]
    pub fn methods_named(&self, id: TypeId, name: &str) -> Vec<Arc<MethodDef>> {
        self.class_chain(id)
            .into_iter()
            .filter_map(|t| self.get(t))
            .flat_map(|t| t.methods.iter())
            .filter(|m| m.name == name && m.kind == MethodKind::Ordinary)
            .cloned()
            .collect()
    }

    /// Methods of `id` itself of the given kind.
    #[must_use]
    pub fn declared_methods_of_kind(&self, id: TypeId, kind: MethodKind) -> Vec<Arc<MethodDef>> {
        self.get(id)
            .map(|t| t.methods.iter().filter(|m| m.kind == kind).cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn extensions_named(&self, name: &str) -> Vec<Arc<MethodDef>> {
        self.extensions
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn constructors(&self, id: TypeId) -> Vec<Arc<ConstructorDef>> {
        self.get(id)
            .map(|t| t.constructors.clone())
            .unwrap_or_default()
    }

    fn member_scope(&self, id: TypeId) -> Vec<TypeId> {
        if self.is_interface(&Type::Named(id)) {
            let mut scope = vec![id];
            scope.extend(self.all_interfaces(id));
            scope
        } else {
            self.class_chain(id)
        }
    }

    /// Current value of a static field.
    #[must_use]
    pub fn static_value(&self, id: TypeId, name: &str) -> Option<Value> {
        self.get(id)?.statics.read().get(name).cloned()
    }

    pub fn set_static_value(&self, id: TypeId, name: &str, value: Value) {
        if let Some(def) = self.get(id) {
            def.statics.write().insert(name.to_owned(), value);
        }
    }

    /// Default value of a type: zero for primitives, a fresh instance for structs,
    /// the zero constant for enums and null for everything else.
    #[must_use]
    pub fn default_value(&self, ty: &Type) -> Value {
        match ty {
            Type::Primitive(p) => Value::default_for(*p),
            Type::Named(id) => match self.kind_of(ty) {
                Some(TypeKind::Enum { .. }) => Value::Enum { ty: *id, value: 0 },
                Some(TypeKind::Struct) => Value::Object(self.instantiate(*id)),
                _ => Value::Null,
            },
            Type::Null | Type::Nullable(_) | Type::Array { .. } => Value::Null,
        }
    }

    /// A new instance with every instance field and auto property at its default.
    #[must_use]
    pub fn instantiate(&self, id: TypeId) -> ObjectRef {
        let obj = ObjectRef::new(id);
        for field in self.instance_fields(id) {
            if obj.get(&field.name).is_none() {
                obj.set(&field.name, self.default_value(&field.ty));
            }
        }
        for def in self.class_chain(id).into_iter().filter_map(|t| self.get(t)) {
            for prop in def.properties.iter().filter(|p| p.storage && !p.is_static) {
                if obj.get(&prop.name).is_none() {
                    obj.set(&prop.name, self.default_value(&prop.ty));
                }
            }
        }
        obj
    }
}

impl TypeProvider for TypeCatalog {
    fn get_type(&self, name: &str) -> Option<Type> {
        Primitive::from_name(name)
            .map(Type::Primitive)
            .or_else(|| self.find(name).map(Type::Named))
    }

    fn types(&self) -> Vec<Type> {
        self.types.iter().map(|t| Type::Named(t.id)).collect()
    }

    fn local_module(&self) -> Option<&str> {
        Some(&self.local_module)
    }

    fn referenced_modules(&self) -> Vec<String> {
        let mut modules: Vec<String> = self
            .types
            .iter()
            .map(|t| t.module.clone())
            .filter(|m| *m != self.local_module)
            .collect();
        modules.sort();
        modules.dedup();
        modules
    }
}

/// Adds members to a declared type.
#[must_use]
pub struct TypeBuilder<'a> {
    catalog: &'a mut TypeCatalog,
    id: TypeId,
}

impl TypeBuilder<'_> {
    fn def_mut(&mut self) -> &mut TypeDef {
        &mut self.catalog.types[self.id.0]
    }

    pub fn base(mut self, base: TypeId) -> Self {
        if let TypeKind::Class { base: b, .. } = &mut self.def_mut().kind {
            *b = Some(base);
        }
        self
    }

    pub fn sealed(mut self) -> Self {
        if let TypeKind::Class { sealed, .. } = &mut self.def_mut().kind {
            *sealed = true;
        }
        self
    }

    pub fn implements(mut self, interface: TypeId) -> Self {
        self.def_mut().interfaces.push(interface);
        self
    }

    pub fn field(mut self, mut field: FieldDef) -> Self {
        field.declaring = self.id;
        if field.is_static {
            let value = field.constant.clone().or_else(|| field.initial.take());
            if let Some(value) = value {
                self.def_mut().statics.get_mut().insert(field.name.clone(), value);
            }
        }
        self.def_mut().fields.push(Arc::new(field));
        self
    }

    /// A named enum member.
    pub fn member(self, name: &str, value: i64) -> Self {
        let id = self.id;
        self.field(FieldDef::new(name, Type::Named(id)).constant(Value::Enum { ty: id, value }))
    }

    pub fn property(mut self, mut property: PropertyDef) -> Self {
        property.declaring = self.id;
        self.def_mut().properties.push(Arc::new(property));
        self
    }

    pub fn method(mut self, mut method: MethodDef) -> Self {
        method.declaring = Some(self.id);
        method.declaring_name = self.catalog.types[self.id.0].name.clone();
        self.def_mut().methods.push(Arc::new(method));
        self
    }

    pub fn constructor(mut self, mut ctor: ConstructorDef) -> Self {
        ctor.declaring = self.id;
        self.def_mut().constructors.push(Arc::new(ctor));
        self
    }

    #[must_use]
    pub fn id(self) -> TypeId {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hierarchy() -> (TypeCatalog, TypeId, TypeId, TypeId) {
        let mut catalog = TypeCatalog::new();
        let shape = catalog.interface("Geo.IShape").id();
        let base = catalog
            .class("Geo.Base")
            .implements(shape)
            .field(FieldDef::new("Id", Type::INT32))
            .id();
        let derived = catalog
            .class("Geo.Circle")
            .base(base)
            .field(FieldDef::new("Radius", Type::DOUBLE))
            .property(PropertyDef::auto("Label", Type::STRING))
            .id();
        (catalog, shape, base, derived)
    }

    #[test]
    fn host_error_message() {
        assert_eq!(HostError::new("boom").to_string(), "boom");
    }

    #[test]
    fn find_by_full_and_short_name() {
        let (catalog, _, base, derived) = hierarchy();
        assert_eq!(catalog.find("Geo.Base"), Some(base));
        assert_eq!(catalog.find("Circle"), Some(derived));
        assert_eq!(catalog.find("Square"), None);
    }

    #[test]
    fn assignability_follows_inheritance_and_interfaces() {
        let (catalog, shape, base, derived) = hierarchy();
        assert!(catalog.is_assignable(&Type::Named(base), &Type::Named(derived)));
        assert!(!catalog.is_assignable(&Type::Named(derived), &Type::Named(base)));
        assert!(catalog.is_assignable(&Type::Named(shape), &Type::Named(derived)));
        assert!(catalog.is_assignable(&Type::OBJECT, &Type::Named(derived)));
        assert!(catalog.is_assignable(&Type::OBJECT, &Type::INT32));
    }

    #[test]
    fn array_covariance_only_for_reference_elements() {
        let (catalog, _, base, derived) = hierarchy();
        assert!(catalog.is_assignable(
            &Type::array(Type::Named(base)),
            &Type::array(Type::Named(derived))
        ));
        assert!(!catalog.is_assignable(&Type::array(Type::INT64), &Type::array(Type::INT32)));
        assert!(!catalog.is_assignable(
            &Type::array_of_rank(Type::Named(base), 2),
            &Type::array(Type::Named(derived))
        ));
    }

    #[test]
    fn instantiate_fills_inherited_defaults() {
        let (catalog, _, _, derived) = hierarchy();
        let obj = catalog.instantiate(derived);
        assert_eq!(obj.get("Id"), Some(Value::Int32(0)));
        assert_eq!(obj.get("Radius"), Some(Value::Double(0.0)));
        assert_eq!(obj.get("Label"), Some(Value::Null));
    }

    #[test]
    fn field_lookup_walks_base_chain() {
        let (catalog, _, base, derived) = hierarchy();
        let id = catalog.find_field(derived, "Id").expect("inherited field");
        assert_eq!(id.declaring(), base);
        assert!(catalog.find_field(base, "Radius").is_none());
    }

    #[test]
    fn enum_members_are_constants() {
        let mut catalog = TypeCatalog::new();
        let color = catalog
            .enumeration("Paint.Color", Primitive::Int32)
            .member("Red", 0)
            .member("Green", 1)
            .id();
        assert_eq!(catalog.enum_underlying(&Type::Named(color)), Some(Primitive::Int32));
        assert_eq!(
            catalog.static_value(color, "Green"),
            Some(Value::Enum { ty: color, value: 1 })
        );
        assert_eq!(
            catalog.default_value(&Type::Named(color)),
            Value::Enum { ty: color, value: 0 }
        );
    }

    #[test]
    fn provider_resolves_primitives_and_named_types() {
        let (catalog, _, base, _) = hierarchy();
        assert_eq!(catalog.get_type("System.String"), Some(Type::STRING));
        assert_eq!(catalog.get_type("Geo.Base"), Some(Type::Named(base)));
        assert_eq!(catalog.types().len(), 3);
    }

    #[test]
    fn auto_property_reads_and_writes_instance_storage() {
        let (catalog, _, _, derived) = hierarchy();
        let prop = catalog.find_property(derived, "Label").expect("property");
        let obj = Value::Object(catalog.instantiate(derived));
        prop.set(&obj, &[], Value::from("disc")).unwrap();
        assert_eq!(prop.get(&obj, &[]).unwrap(), Value::from("disc"));
    }
}
