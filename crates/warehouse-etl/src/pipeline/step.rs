use super::progress::RunStage;
use crate::error::Result;
use polars::prelude::*;

/// One named unit of a pipeline: a function from a table to a table.
///
/// Source steps ignore their input; sink steps usually return it unchanged so
/// the final table is available to the caller.
pub trait PipelineStep {
    fn name(&self) -> &str;

    /// Stage reported while this step runs.
    fn stage(&self) -> RunStage {
        RunStage::Transforming
    }

    fn run(&self, input: DataFrame) -> Result<DataFrame>;
}

/// A [`PipelineStep`] backed by a closure.
pub struct FnStep<F>
where
    F: Fn(DataFrame) -> Result<DataFrame>,
{
    name: String,
    stage: RunStage,
    f: F,
}

impl<F> FnStep<F>
where
    F: Fn(DataFrame) -> Result<DataFrame>,
{
    pub fn new(name: impl Into<String>, stage: RunStage, f: F) -> Self {
        Self {
            name: name.into(),
            stage,
            f,
        }
    }
}

impl<F> PipelineStep for FnStep<F>
where
    F: Fn(DataFrame) -> Result<DataFrame>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> RunStage {
        self.stage
    }

    fn run(&self, input: DataFrame) -> Result<DataFrame> {
        (self.f)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_step() {
        let step = FnStep::new("double_height", RunStage::Transforming, |df: DataFrame| {
            Ok(df.vstack(&df)?)
        });
        assert_eq!(step.name(), "double_height");
        assert_eq!(step.stage(), RunStage::Transforming);

        let out = step.run(df!["a" => [1i64, 2]].unwrap()).unwrap();
        assert_eq!(out.height(), 4);
    }
}
