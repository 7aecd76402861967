//! `ngen ops`: list the recognized declaration-surface vocabulary

use clap::Args;

use crate::error::CliResult;

/// Print flags, numerical methods, distributions and reductions
#[derive(Args, Debug)]
pub struct OpsCommand {}

impl OpsCommand {
    /// Print the vocabulary tables
    pub fn execute(self) -> CliResult<()> {
        println!("Attribute flags:");
        println!("  population        one value per population (neurons)");
        println!("  postsynaptic      one value per dendrite (synapses)");
        println!("  projection        synonym of postsynaptic");
        println!("  int, bool         scalar type override (default double)");
        println!("  init=<v>          initial value");
        println!("  min=<e>, max=<e>  post-update clamps");
        println!("  unless_refractory reset entries skipped for refractory units");
        println!();
        println!("Numerical methods (equation flags):");
        println!("  explicit          forward Euler (default)");
        println!("  implicit          backward Euler, linear in the variable");
        println!("  midpoint          explicit midpoint");
        println!("  exponential       exponential integration of the leaky form");
        println!("  exact             closed form for tau*dx/dt + x = A");
        println!();
        println!("Random distributions:");
        println!("  Uniform(min, max), Normal(mu, sigma), LogNormal(mu, sigma),");
        println!("  Gamma(shape, scale), Exponential(lambda), Bernoulli(p),");
        println!("  Binomial(n, p)");
        println!();
        println!("Global operations over a local variable:");
        println!("  min(x), max(x), mean(x), norm1(x), norm2(x)");
        println!();
        println!("Special terms:");
        println!("  sum(target)       summed synaptic input of a channel");
        println!("  if c then a else b  conditional expression");
        Ok(())
    }
}
