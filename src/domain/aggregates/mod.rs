//! Aggregates module
pub mod cart;
pub mod discount;
pub mod image;
pub mod order;
pub mod product;
pub mod user;

pub use cart::{Cart, CartError, CartItem};
pub use discount::{DiscountCode, DiscountError, DiscountType, NewDiscount};
pub use image::{ImageError, ImageInput, ImagePatch, ImageView, PendingUpload, ProductImage, RejectedUpload, UploadRejection};
pub use order::{
    CheckoutItem, CheckoutRequest, LineItem, Order, OrderError, OrderStatus, OrderTotals, PaymentMethod, PaymentStatus,
    PricingPolicy, ShippingAddress, StatusChange, StatusEntry,
};
pub use product::{AttributeSchema, Category, Product, ProductFlags, ProductInput, Variant, VariantError, VariantInput};
pub use user::{Role, User, UserStatus, UserUpdate};
