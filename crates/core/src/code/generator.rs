use std::sync::Arc;

use super::checker::UniquenessChecker;
use super::counter::Counters;
use super::entity::Entity;
use super::pattern::fixed_length;
use crate::catalog::TenantId;
use crate::cnf::COLLISION_BUDGET;
use crate::ctx::Context;
use crate::err::{Error, Result};
use crate::options::EngineOptions;

const TARGET: &str = "tenantcode::core::code::generator";

/// Produces codes which are unique within a tenant.
#[derive(Clone, Debug)]
pub struct CodeGenerator {
	/// The counters shared by every generator in the process
	counters: Arc<Counters>,
	/// How many candidates one call may try
	budget: u32,
}

impl CodeGenerator {
	pub fn new(counters: Arc<Counters>) -> Self {
		Self {
			counters,
			budget: COLLISION_BUDGET,
		}
	}

	/// Take the collision budget from the engine options
	pub fn with_options(mut self, options: &EngineOptions) -> Self {
		self.budget = options.collision_budget;
		self
	}

	pub fn counters(&self) -> &Arc<Counters> {
		&self.counters
	}

	/// Generates a code for an entity which no record of the tenant holds.
	///
	/// Every attempt draws a strictly greater counter for the prefix of the
	/// entity, and stops at the first candidate the checker does not find.
	/// Counters drawn for rejected or abandoned candidates are not reused.
	#[instrument(level = "trace", target = "tenantcode::core::code::generator", skip_all, fields(table = entity.table_identifier(), tenant = %tenant))]
	pub async fn generate_unique<E, C>(
		&self,
		ctx: &Context,
		checker: &C,
		entity: &E,
		pattern: &str,
		tenant: TenantId,
	) -> Result<String>
	where
		E: Entity + ?Sized,
		C: UniquenessChecker + ?Sized,
	{
		let table = entity.table_identifier();
		let prefix = entity.prefix_for(pattern);
		let mut counter = 0;
		for _ in 0..self.budget {
			counter = self.counters.increment(table, tenant, &prefix);
			let candidate = fixed_length(&entity.format(pattern, counter));
			if !ctx.run(checker.exists(table, &candidate, tenant)).await? {
				return Ok(candidate);
			}
			debug!(target: TARGET, table, %tenant, code = %candidate, "Generated code is already taken, retrying");
			yield_now!();
		}
		Err(Error::CollisionBudgetExceeded {
			table: table.to_owned(),
			tenant,
			prefix,
			attempts: self.budget,
			counter,
		})
	}
}
