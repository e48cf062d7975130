// netwatch-filter: Compiled filter convenience wrapper
// Parse + compile in one step; what rule engines store per condition

use crate::bytecode::Bytecode;
use crate::compiler::compile;
use crate::error::FilterResult;
use crate::parser::parse_expr;
use crate::vm::EvalContext;
use netwatch_event::Event;

/// A condition expression compiled once and evaluated per event
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    /// Original expression text (the persisted representation)
    pub source: String,
    pub bytecode: Bytecode,
}

impl CompiledFilter {
    /// Parse and compile an expression
    pub fn new(expression: &str) -> FilterResult<Self> {
        let ast = parse_expr(expression)?;
        let bytecode = compile(&ast)?;
        Ok(Self {
            source: expression.to_string(),
            bytecode,
        })
    }

    /// Evaluate against one event using the given context
    pub fn matches(&self, ctx: &mut EvalContext, event: &Event) -> bool {
        ctx.eval(&self.bytecode, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netwatch_event::{IfName, LinkInfo, Payload};

    #[test]
    fn test_compiled_filter_roundtrip() {
        let filter = CompiledFilter::new("interface == \"eth0\"").unwrap();
        assert_eq!(filter.source, "interface == \"eth0\"");

        let event = Event::new(
            16,
            IfName::new("eth0").unwrap(),
            Payload::Link(LinkInfo::default()),
        );
        let mut ctx = EvalContext::new();
        assert!(filter.matches(&mut ctx, &event));
    }

    #[test]
    fn test_invalid_expression_rejected() {
        assert!(CompiledFilter::new("interface ==").is_err());
    }
}
