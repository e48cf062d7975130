// netwatch-filter: Stack VM
// Evaluates compiled bytecode against one event; never errors

use crate::ast::FieldId;
use crate::bytecode::{Bytecode, OpCode, OPCODE_COUNT};
use netwatch_event::Event;
use regex::Regex;
use std::time::Instant;
use tracing::warn;

/// Tagged VM value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(i64),
    Str(String),
}

impl Value {
    /// Boolean interpretation used by jumps, logic ops and `Return`
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
        }
    }
}

/// Per-opcode timing bucket
#[derive(Debug, Clone, Copy)]
pub struct OpProfile {
    pub count: u64,
    pub total_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
}

impl Default for OpProfile {
    fn default() -> Self {
        Self {
            count: 0,
            total_ns: 0,
            min_ns: u64::MAX,
            max_ns: 0,
        }
    }
}

impl OpProfile {
    fn record(&mut self, ns: u64) {
        self.count += 1;
        self.total_ns += ns;
        self.min_ns = self.min_ns.min(ns);
        self.max_ns = self.max_ns.max(ns);
    }
}

/// Evaluation timing profile, per context and per opcode
#[derive(Debug, Clone)]
pub struct VmProfile {
    pub evals: OpProfile,
    pub per_op: [OpProfile; OPCODE_COUNT],
}

impl Default for VmProfile {
    fn default() -> Self {
        Self {
            evals: OpProfile::default(),
            per_op: [OpProfile::default(); OPCODE_COUNT],
        }
    }
}

/// Evaluation context
///
/// Owns the value stack and the regex cache. The cache is scanned
/// linearly and never evicted: it grows with the number of distinct
/// patterns in installed rules, not with event volume. A context is
/// not shared across threads; each worker carries its own.
pub struct EvalContext {
    stack: Vec<Value>,
    regex_cache: Vec<(String, Regex)>,
    pub eval_count: u64,
    pub match_count: u64,
    profile: Option<Box<VmProfile>>,
}

impl Default for EvalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalContext {
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(16),
            regex_cache: Vec::new(),
            eval_count: 0,
            match_count: 0,
            profile: None,
        }
    }

    /// Context that records per-opcode timing
    pub fn with_profiling() -> Self {
        let mut ctx = Self::new();
        ctx.profile = Some(Box::default());
        ctx
    }

    pub fn profile(&self) -> Option<&VmProfile> {
        self.profile.as_deref()
    }

    pub fn cached_patterns(&self) -> usize {
        self.regex_cache.len()
    }

    fn regex_for(&mut self, pattern: &str) -> Option<&Regex> {
        if let Some(index) = self.regex_cache.iter().position(|(p, _)| p == pattern) {
            return Some(&self.regex_cache[index].1);
        }
        match Regex::new(pattern) {
            Ok(compiled) => {
                self.regex_cache.push((pattern.to_string(), compiled));
                self.regex_cache.last().map(|(_, r)| r)
            }
            Err(error) => {
                warn!(%pattern, %error, "invalid regex in filter; match yields false");
                None
            }
        }
    }

    /// Evaluate bytecode against an event
    ///
    /// A protocol-scoped field without its payload short-circuits the
    /// whole expression to `false`; type-mismatched comparisons yield
    /// `false` without aborting.
    pub fn eval(&mut self, bytecode: &Bytecode, event: &Event) -> bool {
        self.eval_count += 1;
        self.stack.clear();

        let eval_start = self.profile.is_some().then(Instant::now);
        let result = self.run(bytecode, event);

        if let (Some(profile), Some(start)) = (self.profile.as_deref_mut(), eval_start) {
            profile.evals.record(start.elapsed().as_nanos() as u64);
        }
        if result {
            self.match_count += 1;
        }
        result
    }

    fn run(&mut self, bytecode: &Bytecode, event: &Event) -> bool {
        let instructions = &bytecode.instructions;
        let mut pc = 0usize;

        while pc < instructions.len() {
            let instr = instructions[pc];
            let op_start = self.profile.is_some().then(Instant::now);

            let mut next_pc = pc + 1;
            match instr.op {
                OpCode::PushField => {
                    let field = FieldId::from_code(instr.operand as u16);
                    match field_value(event, field) {
                        Some(value) => self.stack.push(value),
                        // Missing payload fails the whole expression
                        None => {
                            self.finish_op(instr.op, op_start);
                            return false;
                        }
                    }
                }
                OpCode::PushString => {
                    let value = bytecode
                        .strings
                        .get(instr.operand as usize)
                        .cloned()
                        .unwrap_or_default();
                    self.stack.push(Value::Str(value));
                }
                OpCode::PushNumber => self.stack.push(Value::Number(instr.operand)),
                OpCode::Pop => {
                    self.stack.pop();
                }
                OpCode::Eq | OpCode::Ne | OpCode::Lt | OpCode::Gt | OpCode::Le | OpCode::Ge => {
                    let rhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    let lhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    self.stack.push(Value::Bool(compare(instr.op, &lhs, &rhs)));
                }
                OpCode::Match | OpCode::NMatch => {
                    let rhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    let lhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    let matched = match (&lhs, &rhs) {
                        (Value::Str(text), Value::Str(pattern)) => self
                            .regex_for(pattern)
                            .map(|regex| regex.is_match(text))
                            .unwrap_or(false),
                        // Both operands must be strings
                        _ => false,
                    };
                    let result = if instr.op == OpCode::Match {
                        matched
                    } else {
                        !matched
                    };
                    self.stack.push(Value::Bool(result));
                }
                OpCode::In => {
                    let count = instr.operand.max(0) as usize;
                    let mut found = false;
                    let split = self.stack.len().saturating_sub(count);
                    let candidates = self.stack.split_off(split);
                    let lhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    for candidate in &candidates {
                        if compare(OpCode::Eq, &lhs, candidate) {
                            found = true;
                            break;
                        }
                    }
                    self.stack.push(Value::Bool(found));
                }
                OpCode::And => {
                    let rhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    let lhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    self.stack.push(Value::Bool(lhs.truthy() && rhs.truthy()));
                }
                OpCode::Or => {
                    let rhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    let lhs = self.stack.pop().unwrap_or(Value::Bool(false));
                    self.stack.push(Value::Bool(lhs.truthy() || rhs.truthy()));
                }
                OpCode::Not => {
                    let value = self.stack.pop().unwrap_or(Value::Bool(false));
                    self.stack.push(Value::Bool(!value.truthy()));
                }
                OpCode::Jump => {
                    next_pc = (pc as i64 + 1 + instr.operand).max(0) as usize;
                }
                OpCode::JumpIfFalse => {
                    // Peeks: the operand stays as the sub-expression result
                    let top = self.stack.last().map(Value::truthy).unwrap_or(false);
                    if !top {
                        next_pc = (pc as i64 + 1 + instr.operand).max(0) as usize;
                    }
                }
                OpCode::JumpIfTrue => {
                    let top = self.stack.last().map(Value::truthy).unwrap_or(false);
                    if top {
                        next_pc = (pc as i64 + 1 + instr.operand).max(0) as usize;
                    }
                }
                OpCode::Return => {
                    self.finish_op(instr.op, op_start);
                    return self.stack.pop().map(|v| v.truthy()).unwrap_or(false);
                }
                OpCode::Nop => {}
            }

            self.finish_op(instr.op, op_start);
            pc = next_pc;
        }

        // Program fell off the end: top of stack is the result
        self.stack.pop().map(|v| v.truthy()).unwrap_or(false)
    }

    fn finish_op(&mut self, op: OpCode, started: Option<Instant>) {
        if let (Some(profile), Some(start)) = (self.profile.as_deref_mut(), started) {
            profile.per_op[op.index()].record(start.elapsed().as_nanos() as u64);
        }
    }
}

/// Typed comparison; mismatched types are `false`, never an error
fn compare(op: OpCode, lhs: &Value, rhs: &Value) -> bool {
    use std::cmp::Ordering;

    let ordering = match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        _ => return false,
    };

    match op {
        OpCode::Eq => ordering == Ordering::Equal,
        OpCode::Ne => ordering != Ordering::Equal,
        OpCode::Lt => ordering == Ordering::Less,
        OpCode::Gt => ordering == Ordering::Greater,
        OpCode::Le => ordering != Ordering::Greater,
        OpCode::Ge => ordering != Ordering::Less,
        _ => false,
    }
}

/// Extract a field from the event
///
/// `None` means the field is unavailable on this event (protocol-scoped
/// field without the matching payload, or an unknown field name).
fn field_value(event: &Event, field: FieldId) -> Option<Value> {
    let payload = &event.payload;
    match field {
        FieldId::Interface => Some(Value::Str(event.interface.as_str().to_string())),
        FieldId::MessageType => Some(Value::Number(event.message_type as i64)),
        FieldId::EventType => Some(Value::Number(event.event_type.code() as i64)),
        FieldId::Namespace => Some(Value::Str(event.namespace_str().to_string())),
        FieldId::Timestamp => Some(Value::Number(event.timestamp as i64)),
        FieldId::Sequence => Some(Value::Number(event.sequence as i64)),

        FieldId::LinkIfname => payload
            .as_link()
            .map(|l| Value::Str(l.ifname.as_str().to_string())),
        FieldId::LinkIfindex => payload.as_link().map(|l| Value::Number(l.ifindex as i64)),
        FieldId::LinkFlags => payload.as_link().map(|l| Value::Number(l.flags as i64)),
        FieldId::LinkMtu => payload.as_link().map(|l| Value::Number(l.mtu as i64)),
        FieldId::LinkOperstate => payload
            .as_link()
            .map(|l| Value::Number(l.operstate as i64)),
        FieldId::LinkQdisc => payload.as_link().map(|l| Value::Str(l.qdisc.clone())),

        FieldId::AddrFamily => payload.as_addr().map(|a| Value::Number(a.family as i64)),
        FieldId::AddrAddress => payload.as_addr().map(|a| Value::Str(a.address.clone())),
        FieldId::AddrPrefixlen => payload
            .as_addr()
            .map(|a| Value::Number(a.prefixlen as i64)),
        FieldId::AddrScope => payload.as_addr().map(|a| Value::Number(a.scope as i64)),

        FieldId::RouteFamily => payload.as_route().map(|r| Value::Number(r.family as i64)),
        FieldId::RouteDst => payload.as_route().map(|r| Value::Str(r.dst.clone())),
        FieldId::RouteGateway => payload.as_route().map(|r| Value::Str(r.gateway.clone())),
        FieldId::RouteOif => payload.as_route().map(|r| Value::Number(r.oif as i64)),
        FieldId::RouteTable => payload.as_route().map(|r| Value::Number(r.table as i64)),
        FieldId::RouteProtocol => payload
            .as_route()
            .map(|r| Value::Number(r.protocol as i64)),

        FieldId::NeighFamily => payload.as_neigh().map(|n| Value::Number(n.family as i64)),
        FieldId::NeighDst => payload.as_neigh().map(|n| Value::Str(n.dst.clone())),
        FieldId::NeighLladdr => payload.as_neigh().map(|n| Value::Str(n.lladdr.clone())),
        FieldId::NeighState => payload.as_neigh().map(|n| Value::Number(n.state as i64)),

        FieldId::SockFamily => payload.as_sock().map(|s| Value::Number(s.family as i64)),
        FieldId::SockProtocol => payload
            .as_sock()
            .map(|s| Value::Number(s.protocol as i64)),
        FieldId::SockSrcPort => payload
            .as_sock()
            .map(|s| Value::Number(s.src_port as i64)),
        FieldId::SockDstPort => payload
            .as_sock()
            .map(|s| Value::Number(s.dst_port as i64)),
        FieldId::SockState => payload.as_sock().map(|s| Value::Number(s.state as i64)),

        FieldId::CtProto => payload
            .as_conntrack()
            .map(|c| Value::Number(c.proto as i64)),
        FieldId::CtSrc => payload.as_conntrack().map(|c| Value::Str(c.src.clone())),
        FieldId::CtDst => payload.as_conntrack().map(|c| Value::Str(c.dst.clone())),
        FieldId::CtState => payload
            .as_conntrack()
            .map(|c| Value::Str(c.state.clone())),

        FieldId::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::parser::parse_expr;
    use netwatch_event::{IfName, LinkInfo, Payload, RouteInfo};

    fn link_event(ifname: &str, message_type: u16) -> Event {
        Event::new(
            message_type,
            IfName::new(ifname).unwrap(),
            Payload::Link(LinkInfo {
                ifname: IfName::new(ifname).unwrap(),
                mtu: 1500,
                ..Default::default()
            }),
        )
    }

    fn eval_str(expression: &str, event: &Event) -> bool {
        let bytecode = compile(&parse_expr(expression).unwrap()).unwrap();
        EvalContext::new().eval(&bytecode, event)
    }

    #[test]
    fn test_simple_match_and_counters() {
        let bytecode = compile(&parse_expr("interface == \"eth0\"").unwrap()).unwrap();
        let mut ctx = EvalContext::new();

        assert!(ctx.eval(&bytecode, &link_event("eth0", 16)));
        assert!(!ctx.eval(&bytecode, &link_event("eth1", 16)));

        assert_eq!(ctx.eval_count, 2);
        assert_eq!(ctx.match_count, 1);
    }

    #[test]
    fn test_short_circuit_and() {
        let expr = "interface == \"eth0\" AND message_type == 16";
        assert!(eval_str(expr, &link_event("eth0", 16)));
        assert!(!eval_str(expr, &link_event("eth0", 17)));
        assert!(!eval_str(expr, &link_event("eth1", 16)));
        assert!(!eval_str(expr, &link_event("eth1", 17)));
    }

    #[test]
    fn test_regex_and_in() {
        let expr = "interface =~ \"eth.*\" AND message_type IN [16, 17]";
        assert!(eval_str(expr, &link_event("eth0", 16)));
        assert!(eval_str(expr, &link_event("eth9", 17)));
        assert!(!eval_str(expr, &link_event("eth0", 18)));
        assert!(!eval_str(expr, &link_event("wlan0", 16)));
    }

    #[test]
    fn test_not_and_parens() {
        let expr = "NOT (interface == \"lo\" OR interface == \"dummy0\")";
        assert!(eval_str(expr, &link_event("eth0", 16)));
        assert!(!eval_str(expr, &link_event("lo", 16)));
    }

    #[test]
    fn test_numeric_ordering() {
        let event = link_event("eth0", 20);
        assert!(eval_str("message_type > 16", &event));
        assert!(eval_str("message_type >= 20", &event));
        assert!(eval_str("message_type <= 20", &event));
        assert!(!eval_str("message_type < 20", &event));
    }

    #[test]
    fn test_type_mismatch_is_false() {
        let event = link_event("eth0", 16);
        // String field against number literal: false, not an error
        assert!(!eval_str("interface == 16", &event));
        assert!(!eval_str("interface != 16", &event));
        // But the enclosing OR can still succeed
        assert!(eval_str("interface == 16 OR message_type == 16", &event));
    }

    #[test]
    fn test_missing_payload_short_circuits_to_false() {
        let event = link_event("eth0", 16);
        // Route-scoped field on a link event
        assert!(!eval_str("nl.route.gateway == \"10.0.0.1\"", &event));
        // The whole expression fails, even a tautological OR branch after it
        assert!(!eval_str("nl.route.gateway == \"x\" OR message_type == 16", &event));
    }

    #[test]
    fn test_protocol_scoped_fields_resolve() {
        let mut event = link_event("eth0", 16);
        event.payload = Payload::Route(RouteInfo {
            gateway: "10.0.0.1".to_string(),
            table: 254,
            ..Default::default()
        });

        assert!(eval_str("nl.route.gateway == \"10.0.0.1\"", &event));
        assert!(eval_str("nl.route.table == 254", &event));
    }

    #[test]
    fn test_link_payload_fields() {
        let event = link_event("eth0", 16);
        assert!(eval_str("nl.link.ifname == \"eth0\"", &event));
        assert!(eval_str("nl.link.mtu == 1500", &event));
    }

    #[test]
    fn test_namespace_strict_empty_comparison() {
        let event = link_event("eth0", 16);
        assert!(eval_str("namespace == \"\"", &event));
        assert!(!eval_str("namespace == \"blue\"", &event));

        let mut namespaced = link_event("eth0", 16);
        namespaced.namespace = Some("blue".to_string());
        assert!(eval_str("namespace == \"blue\"", &namespaced));
        assert!(!eval_str("namespace == \"\"", &namespaced));
    }

    #[test]
    fn test_string_in_list() {
        let expr = "interface IN [\"eth0\", \"eth1\"]";
        assert!(eval_str(expr, &link_event("eth0", 16)));
        assert!(eval_str(expr, &link_event("eth1", 16)));
        assert!(!eval_str(expr, &link_event("eth2", 16)));
    }

    #[test]
    fn test_regex_cache_populates_once() {
        let bytecode = compile(&parse_expr("interface =~ \"eth.*\"").unwrap()).unwrap();
        let mut ctx = EvalContext::new();

        for _ in 0..10 {
            ctx.eval(&bytecode, &link_event("eth0", 16));
        }
        assert_eq!(ctx.cached_patterns(), 1);
    }

    #[test]
    fn test_invalid_regex_is_false() {
        let event = link_event("eth0", 16);
        assert!(!eval_str("interface =~ \"[unclosed\"", &event));
        assert!(eval_str("interface !~ \"[unclosed\"", &event));
    }

    #[test]
    fn test_unknown_field_fails_expression() {
        let event = link_event("eth0", 16);
        assert!(!eval_str("mystery == 1", &event));
    }

    #[test]
    fn test_profiling_records_opcodes() {
        let bytecode =
            compile(&parse_expr("interface == \"eth0\" AND message_type == 16").unwrap()).unwrap();
        let mut ctx = EvalContext::with_profiling();

        ctx.eval(&bytecode, &link_event("eth0", 16));

        let profile = ctx.profile().unwrap();
        assert_eq!(profile.evals.count, 1);
        assert!(profile.per_op[OpCode::PushField.index()].count >= 1);
        assert!(profile.per_op[OpCode::Eq.index()].count >= 1);
        assert!(profile.evals.min_ns <= profile.evals.max_ns);
    }

    #[test]
    fn test_optimized_matches_unoptimized_semantics() {
        // Optimizer must not change results on a set of shapes it rewrites
        let cases = [
            ("NOT NOT interface == \"eth0\"", true),
            ("1 == 1 AND interface == \"eth0\"", true),
            ("1 == 2 OR interface == \"eth0\"", true),
            ("NOT NOT NOT interface == \"eth0\"", false),
        ];
        for (expr, expected) in cases {
            assert_eq!(eval_str(expr, &link_event("eth0", 16)), expected, "{}", expr);
        }
    }
}
