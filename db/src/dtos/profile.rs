use common::misc::Role;

pub struct ProfileCreateRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub company_name: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub stripe_customer_id: Option<String>,
}

pub struct ProfileUpdateRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company_name: Option<String>,
    pub phone: Option<String>,
}
