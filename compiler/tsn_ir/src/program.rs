//! The resolved program: arenas plus structural queries.

use thiserror::Error;

use crate::{
    ClassDecl, Decl, DeclId, DeclKind, Expr, ExprId, FunctionDecl, FunctionKind, InterfaceDecl,
    Name, ParamDecl, PropertyDecl, Stmt, StmtId, StringInterner, TsType, TypeId, TypePool,
};

/// Front-end contract violations detected while querying a [`Program`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProgramError {
    #[error("declaration {0:?} does not exist")]
    DanglingDecl(DeclId),
    #[error("declaration {decl:?} is not a {expected}")]
    WrongDeclKind { decl: DeclId, expected: &'static str },
}

/// A fully resolved compilation unit.
#[derive(Clone, Debug, Default)]
pub struct Program {
    pub interner: StringInterner,
    pub types: TypePool,
    pub(crate) decls: Vec<Decl>,
    pub(crate) exprs: Vec<Expr>,
    pub(crate) stmts: Vec<Stmt>,
    /// Top-level statements in order.
    pub entry: Vec<StmtId>,
}

impl Program {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Arena access ────────────────────────────────────────────────

    /// # Panics
    /// Panics on an id not produced by this program's builder.
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    /// # Panics
    /// Panics on an id not produced by this program's builder.
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> Result<&Decl, ProgramError> {
        self.decls
            .get(id.index())
            .ok_or(ProgramError::DanglingDecl(id))
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    /// Resolve an interned name.
    pub fn name(&self, name: Name) -> &str {
        self.interner.lookup(name)
    }

    pub fn decl_name(&self, id: DeclId) -> &str {
        self.decl(id).map_or("<unknown>", |d| self.name(d.name))
    }

    // ── Typed accessors ─────────────────────────────────────────────

    pub fn function(&self, id: DeclId) -> Result<&FunctionDecl, ProgramError> {
        match &self.decl(id)?.kind {
            DeclKind::Function(f) => Ok(f),
            _ => Err(wrong(id, "function")),
        }
    }

    pub fn class(&self, id: DeclId) -> Result<&ClassDecl, ProgramError> {
        match &self.decl(id)?.kind {
            DeclKind::Class(c) => Ok(c),
            _ => Err(wrong(id, "class")),
        }
    }

    pub fn interface(&self, id: DeclId) -> Result<&InterfaceDecl, ProgramError> {
        match &self.decl(id)?.kind {
            DeclKind::Interface(i) => Ok(i),
            _ => Err(wrong(id, "interface")),
        }
    }

    pub fn param(&self, id: DeclId) -> Result<&ParamDecl, ProgramError> {
        match &self.decl(id)?.kind {
            DeclKind::Parameter(p) => Ok(p),
            _ => Err(wrong(id, "parameter")),
        }
    }

    pub fn property(&self, id: DeclId) -> Result<&PropertyDecl, ProgramError> {
        match &self.decl(id)?.kind {
            DeclKind::Property(p) => Ok(p),
            _ => Err(wrong(id, "property")),
        }
    }

    // ── Class structure ─────────────────────────────────────────────

    /// The class followed by its bases, derived to base.
    pub fn class_chain(&self, class: DeclId) -> Result<Vec<DeclId>, ProgramError> {
        let mut chain = vec![class];
        let mut current = self.class(class)?.base;
        while let Some(base) = current {
            // Guard against malformed cyclic hierarchies.
            if chain.contains(&base) {
                break;
            }
            chain.push(base);
            current = self.class(base)?.base;
        }
        Ok(chain)
    }

    /// Non-static properties of the whole chain, base-most class first.
    pub fn instance_properties(&self, class: DeclId) -> Result<Vec<DeclId>, ProgramError> {
        let mut props = Vec::new();
        for &c in self.class_chain(class)?.iter().rev() {
            for &m in &self.class(c)?.members {
                let decl = self.decl(m)?;
                if matches!(decl.kind, DeclKind::Property(_))
                    && !decl.flags.contains(crate::DeclFlags::STATIC)
                {
                    props.push(m);
                }
            }
        }
        Ok(props)
    }

    /// Own (not inherited) members of `class` that are functions of `kind`.
    pub fn own_functions(
        &self,
        class: DeclId,
        kind: FunctionKind,
    ) -> Result<Vec<DeclId>, ProgramError> {
        let mut out = Vec::new();
        for &m in &self.class(class)?.members {
            if let DeclKind::Function(f) = &self.decl(m)?.kind {
                if f.kind == kind {
                    out.push(m);
                }
            }
        }
        Ok(out)
    }

    pub fn constructor_of(&self, class: DeclId) -> Result<Option<DeclId>, ProgramError> {
        Ok(self
            .own_functions(class, FunctionKind::Constructor)?
            .into_iter()
            .next())
    }

    /// First member named `name` of one of the given function kinds,
    /// searching `chain` in order.
    pub fn find_function_in(
        &self,
        chain: &[DeclId],
        name: Name,
        kinds: &[FunctionKind],
    ) -> Result<Option<DeclId>, ProgramError> {
        for &c in chain {
            for &m in &self.class(c)?.members {
                let decl = self.decl(m)?;
                if decl.name != name {
                    continue;
                }
                if let DeclKind::Function(f) = &decl.kind {
                    if kinds.contains(&f.kind) {
                        return Ok(Some(m));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Static property `name` declared directly on `class`.
    pub fn static_property(&self, class: DeclId, name: Name) -> Result<Option<DeclId>, ProgramError> {
        for &m in &self.class(class)?.members {
            let decl = self.decl(m)?;
            if decl.name == name
                && decl.flags.contains(crate::DeclFlags::STATIC)
                && matches!(decl.kind, DeclKind::Property(_))
            {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    /// Ordered `(name, type)` list of an interface.
    pub fn interface_fields(&self, iface: DeclId) -> Result<Vec<(Name, TypeId)>, ProgramError> {
        let mut out = Vec::new();
        for &p in &self.interface(iface)?.properties {
            out.push((self.decl(p)?.name, self.property(p)?.ty));
        }
        Ok(out)
    }

    // ── Type naming ─────────────────────────────────────────────────

    /// Stable human-readable name of a type, used for shape and symbol names.
    pub fn type_name(&self, ty: TypeId) -> String {
        match self.types.get(ty) {
            TsType::Number => "number".to_owned(),
            TsType::Boolean => "boolean".to_owned(),
            TsType::String => "string".to_owned(),
            TsType::Void => "void".to_owned(),
            TsType::Null => "null".to_owned(),
            TsType::Undefined => "undefined".to_owned(),
            TsType::Any => "any".to_owned(),
            TsType::Class(d) | TsType::Interface(d) => self.decl_name(*d).to_owned(),
            TsType::TypeParam(n) => self.name(*n).to_owned(),
            TsType::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|&(n, t)| format!("{}:{}", self.name(n), self.type_name(t)))
                    .collect();
                format!("{{{}}}", inner.join(","))
            }
            TsType::Union(ms) => self.join_names(ms, "|"),
            TsType::Intersection(ms) => self.join_names(ms, "&"),
            TsType::Function(f) => {
                let params: Vec<String> = f.params.iter().map(|&p| self.type_name(p)).collect();
                format!("({})=>{}", params.join(","), self.type_name(f.ret))
            }
        }
    }

    fn join_names(&self, members: &[TypeId], sep: &str) -> String {
        let names: Vec<String> = members.iter().map(|&m| self.type_name(m)).collect();
        names.join(sep)
    }
}

fn wrong(decl: DeclId, expected: &'static str) -> ProgramError {
    ProgramError::WrongDeclKind { decl, expected }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
