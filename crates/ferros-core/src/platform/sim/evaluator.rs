//! Value lookup against a [`ProgramImage`].

use std::sync::Arc;

use crate::error::{FerrosError, FerrosResult};
use crate::handle::{Evaluator, InfoKind, SymbolResolver};
use crate::platform::sim::image::{ProgramImage, Variable, VariableScope};
use crate::types::Address;

/// Evaluator that reads variable values straight out of an image.
///
/// Expressions are plain variable names: args and locals of the function at
/// `pc` are searched first, then package variables.
#[derive(Debug, Clone)]
pub struct ImageEvaluator
{
    image: Arc<ProgramImage>,
}

impl ImageEvaluator
{
    #[must_use]
    pub fn new(image: Arc<ProgramImage>) -> Self
    {
        Self { image }
    }

    fn scoped(&self, scope: VariableScope, pc: Option<Address>) -> impl Iterator<Item = &Variable>
    {
        let function = pc.and_then(|pc| self.image.function_at(pc));
        self.image.variables.iter().filter(move |var| {
            var.scope == scope && (scope == VariableScope::Package || var.function.as_deref() == function)
        })
    }
}

fn render(var: &Variable) -> String
{
    format!("{} = {}", var.name, var.value)
}

impl Evaluator for ImageEvaluator
{
    fn evaluate(&self, expression: &str, pc: Option<Address>) -> FerrosResult<String>
    {
        let name = expression.trim();
        self.scoped(VariableScope::Local, pc)
            .chain(self.scoped(VariableScope::Arg, pc))
            .chain(self.scoped(VariableScope::Package, pc))
            .find(|var| var.name == name)
            .map(|var| var.value.clone())
            .ok_or_else(|| FerrosError::InvalidArgument(format!("could not find symbol value for {name}")))
    }

    fn info(&self, kind: InfoKind, pc: Option<Address>) -> FerrosResult<Vec<String>>
    {
        Ok(match kind {
            InfoKind::Args => self.scoped(VariableScope::Arg, pc).map(render).collect(),
            InfoKind::Locals => self.scoped(VariableScope::Local, pc).map(render).collect(),
            InfoKind::Vars => self.scoped(VariableScope::Package, pc).map(render).collect(),
            InfoKind::Funcs => self.image.functions(),
            InfoKind::Sources => self.image.source_files(),
        })
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn evaluator() -> ImageEvaluator
    {
        ImageEvaluator::new(Arc::new(ProgramImage::demo()))
    }

    #[test]
    fn test_locals_shadow_package_variables_by_scope()
    {
        let eval = evaluator();
        let in_add = Some(Address::new(0x40_2008));

        assert_eq!(eval.evaluate("sum", in_add).unwrap(), "3");
        assert_eq!(eval.evaluate("a", in_add).unwrap(), "1");
        assert_eq!(eval.evaluate("version", in_add).unwrap(), "\"1.0.0\"");
        assert!(eval.evaluate("x", in_add).is_err());
        assert_eq!(eval.evaluate("x", Some(Address::new(0x40_1010))).unwrap(), "1");
    }

    #[test]
    fn test_info_lists()
    {
        let eval = evaluator();
        let in_add = Some(Address::new(0x40_2000));

        assert_eq!(eval.info(InfoKind::Args, in_add).unwrap(), vec!["a = 1", "b = 2"]);
        assert_eq!(eval.info(InfoKind::Locals, in_add).unwrap(), vec!["sum = 3"]);
        assert_eq!(eval.info(InfoKind::Vars, None).unwrap(), vec!["version = \"1.0.0\""]);
        assert_eq!(eval.info(InfoKind::Funcs, None).unwrap().len(), 3);
        assert!(eval.info(InfoKind::Locals, None).unwrap().is_empty());
    }
}
