pub mod publish;
/// Status channel module - moving status events across the message bus
///
/// This module is responsible for:
/// - Serializing (url, status) pairs into wire messages
/// - Publishing wire messages on the bus, best effort
/// - Consuming wire messages and reconstructing the pairs
pub mod subscribe;
pub mod wire;

pub use publish::StatusPublisher;
pub use subscribe::StatusSubscriber;

use crate::config::CurveConfig;

/// Mutual authentication against the broker: the broker's public key plus
/// this client's key pair
pub(crate) fn apply_curve(socket: &zmq::Socket, curve: &CurveConfig) -> zmq::Result<()> {
    socket.set_curve_serverkey(&curve.server_public_key)?;
    socket.set_curve_publickey(&curve.public_key)?;
    socket.set_curve_secretkey(&curve.secret_key)?;
    Ok(())
}
