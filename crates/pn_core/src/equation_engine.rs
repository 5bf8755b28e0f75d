use crate::expansion::{flatten_terms, integer_power, PnOrder};
use crate::symbolic::{rational_to_f64, Expr, SymbolicError};
use crate::system::PNSystem;
use crate::variables::{DerivedVariable, FundamentalVariable};
use std::collections::{BTreeMap, HashMap};

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `f64` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes a state entry (by layout index) onto the stack.
    LoadVar(usize),
    /// Pushes a tidal parameter (0 = Lambda1, 1 = Lambda2) onto the stack.
    LoadParam(usize),
    /// Evaluates a derived variable against the system and pushes it.
    LoadDerived(DerivedVariable),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top value (a), pushes a^n.
    PowI(i32),
    /// Pops top value (a), pushes a^x.
    PowF(f64),
    /// Pops top value (a), pushes sqrt(a).
    Sqrt,
    /// Pops top value (a), pushes ln(a).
    Ln,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }
}

/// Stack-based Virtual Machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `pnsystem`: Numeric state and parameters (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Malformed bytecode evaluates to NaN.
pub struct VM;

impl VM {
    pub fn execute<const PN_ORDER: u32>(
        bytecode: &Bytecode,
        pnsystem: &PNSystem<f64, PN_ORDER>,
        stack: &mut Vec<f64>,
    ) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(*val),
                OpCode::LoadVar(idx) => {
                    stack.push(pnsystem.state().get(*idx).copied().unwrap_or(f64::NAN));
                }
                OpCode::LoadParam(idx) => {
                    stack.push(pnsystem.parameters().get(*idx).copied().unwrap_or(f64::NAN));
                }
                OpCode::LoadDerived(var) => stack.push(var.evaluate(pnsystem)),
                OpCode::Add => {
                    let b = stack.pop().unwrap_or(f64::NAN);
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(a + b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap_or(f64::NAN);
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(a * b);
                }
                OpCode::PowI(n) => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(a.powi(*n));
                }
                OpCode::PowF(x) => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(a.powf(*x));
                }
                OpCode::Sqrt => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(a.sqrt());
                }
                OpCode::Ln => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(a.ln());
                }
            }
        }

        if stack.len() != 1 {
            return f64::NAN;
        }
        stack.pop().unwrap_or(f64::NAN)
    }
}

/// Compiles a symbolic expression (`Expr`) into `Bytecode`.
/// Resolves variable names against the variable catalog.
pub struct Compiler {
    pub var_map: HashMap<&'static str, usize>,
    pub param_map: HashMap<&'static str, usize>,
    pub derived_map: HashMap<&'static str, DerivedVariable>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        let mut var_map = HashMap::new();
        let mut param_map = HashMap::new();
        for var in FundamentalVariable::ALL {
            if var.is_parameter() {
                param_map.insert(var.name(), param_map.len());
            } else {
                var_map.insert(var.name(), var.index());
            }
        }

        let derived_map = DerivedVariable::ALL.iter().map(|d| (d.name(), *d)).collect();

        Self {
            var_map,
            param_map,
            derived_map,
        }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, SymbolicError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), SymbolicError> {
        match expr {
            Expr::Num(r) => ops.push(OpCode::LoadConst(rational_to_f64(r))),
            Expr::Float(x) => ops.push(OpCode::LoadConst(x.0)),
            Expr::Constant(c) => ops.push(OpCode::LoadConst(c.value())),
            Expr::Symbol(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else if let Some(&var) = self.derived_map.get(name) {
                    ops.push(OpCode::LoadDerived(var));
                } else {
                    return Err(SymbolicError::UnknownSymbol(name.to_string()));
                }
            }
            Expr::Add(terms) => self.compile_fold(terms, OpCode::Add, 0.0, ops)?,
            Expr::Mul(factors) => self.compile_fold(factors, OpCode::Mul, 1.0, ops)?,
            Expr::Pow(base, exponent) => {
                self.compile_recursive(base, ops)?;
                if exponent.is_integer() {
                    match i32::try_from(exponent.to_integer()) {
                        Ok(n) => ops.push(OpCode::PowI(n)),
                        Err(_) => ops.push(OpCode::PowF(exponent.to_integer() as f64)),
                    }
                } else if *exponent.numer() == 1 && *exponent.denom() == 2 {
                    ops.push(OpCode::Sqrt);
                } else {
                    ops.push(OpCode::PowF(*exponent.numer() as f64 / *exponent.denom() as f64));
                }
            }
            Expr::Ln(arg) => {
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Ln);
            }
            Expr::Held(inner) => self.compile_recursive(inner, ops)?,
        }
        Ok(())
    }

    fn compile_fold(
        &self,
        items: &[Expr],
        op: OpCode,
        identity: f64,
        ops: &mut Vec<OpCode>,
    ) -> Result<(), SymbolicError> {
        let Some((first, rest)) = items.split_first() else {
            ops.push(OpCode::LoadConst(identity));
            return Ok(());
        };
        self.compile_recursive(first, ops)?;
        for item in rest {
            self.compile_recursive(item, ops)?;
            ops.push(op);
        }
        Ok(())
    }
}

/// A symbolic expression compiled for repeated numeric evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    expression: Expr,
    code: Bytecode,
}

impl CompiledFunction {
    pub fn compile(expression: &Expr) -> Result<Self, SymbolicError> {
        let code = Compiler::new().compile(expression)?;
        Ok(Self {
            expression: expression.clone(),
            code,
        })
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    pub fn evaluate<const PN_ORDER: u32>(&self, pnsystem: &PNSystem<f64, PN_ORDER>) -> f64 {
        let mut stack = Vec::with_capacity(16);
        VM::execute(&self.code, pnsystem, &mut stack)
    }
}

#[derive(Debug, Clone)]
pub struct ExpansionTerm {
    /// Relative power of `v` (absolute power plus the offset).
    pub power: i64,
    pub expression: Expr,
    pub code: Bytecode,
}

/// A flat PN sum compiled one power of `v` at a time, so a single compiled
/// function serves every truncation order.
#[derive(Debug, Clone, Default)]
pub struct PnExpansionFunction {
    terms: Vec<ExpansionTerm>,
}

impl PnExpansionFunction {
    /// Groups the top-level terms of `expr` by `power(var) + offset` and
    /// compiles each group.
    pub fn compile(expr: &Expr, var: &str, offset: i64) -> Result<Self, SymbolicError> {
        let mut groups: BTreeMap<i64, Vec<Expr>> = BTreeMap::new();
        for term in flatten_terms(expr) {
            if term.is_zero() {
                continue;
            }
            let power = integer_power(&term, var)? + offset;
            groups.entry(power).or_default().push(term);
        }

        let compiler = Compiler::new();
        let mut terms = Vec::with_capacity(groups.len());
        for (power, mut group) in groups {
            let expression = if group.len() == 1 {
                group.remove(0)
            } else {
                Expr::Add(group)
            };
            let code = compiler.compile(&expression)?;
            terms.push(ExpansionTerm {
                power,
                expression,
                code,
            });
        }
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[ExpansionTerm] {
        &self.terms
    }

    pub fn powers(&self) -> Vec<i64> {
        self.terms.iter().map(|t| t.power).collect()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Drops the terms above `order`.
    pub fn truncated(&self, order: PnOrder) -> Self {
        Self {
            terms: self
                .terms
                .iter()
                .filter(|t| order.includes(t.power))
                .cloned()
                .collect(),
        }
    }

    /// The kept terms as one flat symbolic sum.
    pub fn expression(&self) -> Expr {
        let mut terms: Vec<Expr> = self
            .terms
            .iter()
            .flat_map(|t| flatten_terms(&t.expression))
            .collect();
        match terms.len() {
            0 => Expr::zero(),
            1 => terms.remove(0),
            _ => Expr::Add(terms),
        }
    }

    /// Sums the terms kept at the system's own PN order.
    pub fn evaluate<const PN_ORDER: u32>(&self, pnsystem: &PNSystem<f64, PN_ORDER>) -> f64 {
        self.evaluate_at(pnsystem.pn_order(), pnsystem)
    }

    pub fn evaluate_at<const PN_ORDER: u32>(
        &self,
        order: PnOrder,
        pnsystem: &PNSystem<f64, PN_ORDER>,
    ) -> f64 {
        let mut stack = Vec::with_capacity(16);
        self.terms
            .iter()
            .take_while(|t| order.includes(t.power))
            .map(|t| VM::execute(&t.code, pnsystem, &mut stack))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_rational::Rational64;

    fn system() -> PNSystem<f64, 4> {
        PNSystem::with_tidal(
            [0.6, 0.4, 0.0, 0.0, 0.5, 0.0, 0.0, -0.2, 1.0, 0.0, 0.0, 0.0, 0.25, 0.0],
            10.0,
            20.0,
        )
    }

    #[test]
    fn compiles_every_node_kind() {
        let v = Expr::symbol("v");
        let expr = Expr::Add(vec![
            Expr::Mul(vec![Expr::rational(1, 2), Expr::powi(v.clone(), 2)]),
            Expr::pow(Expr::symbol("M1"), Rational64::new(1, 2)),
            Expr::pow(v.clone(), Rational64::new(3, 2)),
            Expr::log(v.clone()),
            Expr::held(Expr::constant(crate::symbolic::Constant::Pi)),
            Expr::symbol("Lambda2"),
            Expr::symbol("nu"),
        ]);
        let f = CompiledFunction::compile(&expr).unwrap();
        let expected = 0.5 * 0.0625
            + 0.6f64.sqrt()
            + 0.25f64.powf(1.5)
            + 0.25f64.ln()
            + std::f64::consts::PI
            + 20.0
            + 0.24;
        assert!((f.evaluate(&system()) - expected).abs() < 1e-14);
    }

    #[test]
    fn unknown_symbols_fail_to_compile() {
        let err = CompiledFunction::compile(&Expr::symbol("eta")).unwrap_err();
        assert_eq!(err, SymbolicError::UnknownSymbol("eta".to_string()));
    }

    #[test]
    fn malformed_bytecode_is_nan() {
        let code = Bytecode {
            ops: vec![OpCode::LoadConst(1.0), OpCode::Add],
        };
        assert!(VM::execute(&code, &system(), &mut Vec::new()).is_nan());
        let two_values = Bytecode {
            ops: vec![OpCode::LoadConst(1.0), OpCode::LoadConst(2.0)],
        };
        assert!(VM::execute(&two_values, &system(), &mut Vec::new()).is_nan());
    }

    #[test]
    fn expansion_function_truncates_per_order() {
        let v = Expr::symbol("v");
        // v + 2 v^3 + 3 v^4 with offset -1: relative powers 0, 2, 3.
        let expr = Expr::Add(vec![
            v.clone(),
            Expr::Mul(vec![Expr::int(2), Expr::powi(v.clone(), 3)]),
            Expr::Mul(vec![Expr::int(3), Expr::powi(v, 4)]),
        ]);
        let f = PnExpansionFunction::compile(&expr, "v", -1).unwrap();
        assert_eq!(f.powers(), vec![0, 2, 3]);

        let pn = system();
        let x: f64 = 0.25;
        let full = x + 2.0 * x.powi(3) + 3.0 * x.powi(4);
        assert!((f.evaluate_at(PnOrder::UNBOUNDED, &pn) - full).abs() < 1e-15);
        assert!((f.evaluate(&pn) - full).abs() < 1e-15);
        let two = x + 2.0 * x.powi(3);
        assert!((f.evaluate_at(PnOrder::from_half_orders(2), &pn) - two).abs() < 1e-15);
        assert_eq!(f.truncated(PnOrder::from_half_orders(1)).powers(), vec![0]);
    }

    #[test]
    fn expansion_function_accepts_squared_logs() {
        let v = Expr::symbol("v");
        let expr = Expr::Add(vec![
            Expr::int(1),
            Expr::Mul(vec![
                Expr::powi(v.clone(), 12),
                Expr::powi(Expr::log(v), 2),
            ]),
        ]);
        let f = PnExpansionFunction::compile(&expr, "v", 0).unwrap();
        assert_eq!(f.powers(), vec![0, 12]);

        let pn = system();
        let x: f64 = 0.25;
        let full = 1.0 + x.powi(12) * x.ln().powi(2);
        assert!((f.evaluate_at(PnOrder::UNBOUNDED, &pn) - full).abs() < 1e-15);
        assert_eq!(f.evaluate(&pn), 1.0);
        assert_eq!(f.evaluate_at(PnOrder::from_half_orders(11), &pn), 1.0);
    }
}
