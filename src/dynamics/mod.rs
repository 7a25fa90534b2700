//! Simulation dynamics: integration, global forces, constraint rows, joints, the solver and
//! islands.

pub mod forces;
pub mod integrator;
pub mod island;
pub mod joints;
pub mod molecule;
pub mod solver;

pub use forces::{DragForce, ForceGenerator, ForceRegistry, GravityForce, SpringForce};
pub use integrator::{integrate_position, integrate_velocity};
pub use island::{Island, IslandInputs, IslandManager, IslandState, SleepSettings};
pub use joints::{Joint, JointEndpoint, JointKind, PositionJoint, Suspension, WheelJoint, WheelMotor};
pub use molecule::{ConstraintMolecule, Jacobian, Softness, SolverMass};
pub use solver::{ConstraintSolver, ImpulseSolver, SolverContext, SolverSettings, SolverStepMetrics};
